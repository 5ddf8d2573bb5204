use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use serde::Serialize;
use tracing::{debug, info};

use crate::form::TitleForm;
use crate::storage::KeyValueStore;
use crate::store::{LoadOutcome, StoreError, TaskStore};
use crate::task::Task;

pub const APP_TITLE: &str = "Lista de Tarefas";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    List,
    Edit,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::List => "list",
            Mode::Edit => "edit",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "list" => Ok(Mode::List),
            "edit" => Ok(Mode::Edit),
            other => Err(anyhow!("unknown mode: {other}")),
        }
    }
}

/// Scratch state of the per-row rename flow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InlineEdit {
    pub task_id: Option<u64>,
    pub text: String,
}

impl InlineEdit {
    pub fn clear(&mut self) {
        self.task_id = None;
        self.text.clear();
    }
}

/// Everything a front-end needs to render one frame.
#[derive(Debug, Clone, Serialize)]
pub struct AppView<'a> {
    pub title: &'static str,
    pub mode: Mode,
    pub tasks: &'a [Task],
    pub form_title: &'a str,
    pub inline_edit: &'a InlineEdit,
}

/// The to-do list screen: task store, title form, view mode and inline edit.
///
/// Every committed store mutation returns the view to [`Mode::List`].
#[derive(Debug)]
pub struct App<S> {
    store: TaskStore<S>,
    mode: Mode,
    form: TitleForm,
    inline_edit: InlineEdit,
}

impl<S: KeyValueStore> App<S> {
    /// Builds the screen and loads the stored list.
    #[tracing::instrument(skip_all)]
    pub fn open(store: TaskStore<S>) -> anyhow::Result<(Self, LoadOutcome)> {
        let mut app = Self {
            store,
            mode: Mode::List,
            form: TitleForm::default(),
            inline_edit: InlineEdit::default(),
        };
        let outcome = app.load()?;
        Ok((app, outcome))
    }

    pub fn title(&self) -> &'static str {
        APP_TITLE
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn tasks(&self) -> &[Task] {
        self.store.tasks()
    }

    pub fn store(&self) -> &TaskStore<S> {
        &self.store
    }

    pub fn form(&self) -> &TitleForm {
        &self.form
    }

    pub fn form_mut(&mut self) -> &mut TitleForm {
        &mut self.form
    }

    pub fn inline_edit(&self) -> &InlineEdit {
        &self.inline_edit
    }

    pub fn view(&self) -> AppView<'_> {
        AppView {
            title: APP_TITLE,
            mode: self.mode,
            tasks: self.store.tasks(),
            form_title: self.form.title(),
            inline_edit: &self.inline_edit,
        }
    }

    pub fn load(&mut self) -> anyhow::Result<LoadOutcome> {
        self.store.load()
    }

    /// Adds the form's title as a new task and resets the form.
    #[tracing::instrument(skip(self))]
    pub fn add(&mut self) -> Result<Task, StoreError> {
        let title = self.form.validate()?;
        let task = self.store.add(title)?;
        self.change_mode(Mode::List);
        self.clear();
        Ok(task)
    }

    pub fn clear(&mut self) {
        self.form.reset();
    }

    pub fn remove(&mut self, task: &Task) -> anyhow::Result<bool> {
        let removed = self.store.remove(task)?;
        self.change_mode(Mode::List);
        Ok(removed)
    }

    pub fn mark_as_done(&mut self, task: &Task) -> anyhow::Result<bool> {
        let found = self.store.mark_as_done(task)?;
        self.change_mode(Mode::List);
        Ok(found)
    }

    pub fn mark_as_undone(&mut self, task: &Task) -> anyhow::Result<bool> {
        let found = self.store.mark_as_undone(task)?;
        self.change_mode(Mode::List);
        Ok(found)
    }

    /// Loads `task`'s title into the form and switches to edit mode.
    pub fn edit(&mut self, task: &Task) {
        self.form.set_title(task.title.clone());
        self.change_mode(Mode::Edit);
    }

    /// Commits the form through [`TaskStore::update`]. On a miss nothing
    /// changes, the mode included.
    #[tracing::instrument(skip(self))]
    pub fn update(&mut self) -> Result<bool, StoreError> {
        let title = self.form.validate()?;
        let matched = self.store.update(title)?;
        if matched {
            self.clear();
            self.change_mode(Mode::List);
        } else {
            debug!(mode = %self.mode, "update matched no task");
        }
        Ok(matched)
    }

    pub fn start_edit(&mut self, id: u64) {
        self.inline_edit.text = self
            .store
            .get(id)
            .map(|t| t.title.clone())
            .unwrap_or_default();
        self.inline_edit.task_id = Some(id);
        debug!(id, "inline edit started");
    }

    pub fn set_inline_text(&mut self, text: impl Into<String>) {
        self.inline_edit.text = text.into();
    }

    /// Commits the inline text to task `id`, then clears the inline state
    /// whether or not anything was committed.
    #[tracing::instrument(skip(self))]
    pub fn finish_edit(&mut self, id: u64) -> anyhow::Result<bool> {
        let result = self.store.rename(id, &self.inline_edit.text);
        self.cancel_edit();
        let committed = result?;
        if committed {
            self.change_mode(Mode::List);
        }
        Ok(committed)
    }

    pub fn cancel_edit(&mut self) {
        self.inline_edit.clear();
    }

    pub fn change_mode(&mut self, mode: Mode) {
        if self.mode != mode {
            info!(from = %self.mode, to = %mode, "mode changed");
        }
        self.mode = mode;
    }
}
