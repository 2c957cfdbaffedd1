use thiserror::Error;

/// Normalized input for adding a task from any client (CLI or live session).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskInput {
    pub text: Vec<String>,
    pub due: Option<String>,
}

impl TaskInput {
    pub fn from_line(line: &str) -> Self {
        Self {
            text: line.split_whitespace().map(str::to_string).collect(),
            due: None,
        }
    }

    pub fn require_text(&self) -> Result<(), CaptureError> {
        if self.text.iter().all(|word| word.trim().is_empty()) {
            return Err(CaptureError::EmptyText);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    #[error("Task text cannot be empty")]
    EmptyText,
}
