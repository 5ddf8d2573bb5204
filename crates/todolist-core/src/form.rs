use serde::Serialize;

pub const TITLE_MIN_LEN: usize = 1;
pub const TITLE_MAX_LEN: usize = 40;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("title is required")]
    Required,
    #[error("title is {len} characters long; at most {max} are allowed")]
    TooLong { len: usize, max: usize },
}

/// Checks a title against the form rules: required, 1..=40 characters.
///
/// Length counts Unicode scalar values. Whitespace is not trimmed here; only the
/// inline rename path trims.
pub fn validate_title(title: &str) -> Result<(), ValidationError> {
    let len = title.chars().count();
    if len < TITLE_MIN_LEN {
        return Err(ValidationError::Required);
    }
    if len > TITLE_MAX_LEN {
        return Err(ValidationError::TooLong {
            len,
            max: TITLE_MAX_LEN,
        });
    }
    Ok(())
}

/// The single-field title form shared by the add and update flows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TitleForm {
    title: String,
}

impl TitleForm {
    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
    }

    pub fn reset(&mut self) {
        self.title.clear();
    }

    pub fn validate(&self) -> Result<&str, ValidationError> {
        validate_title(&self.title)?;
        Ok(&self.title)
    }
}
