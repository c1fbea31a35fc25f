//! Semantic output tokens and their literal utterance rendering.
//!
//! The reader and navigator speak in these tokens; the scheduler renders each
//! to at most one utterance. `Boundary`, `Next` and `Previous` are control
//! tokens for call-site logic and render to silence.

/// One unit of semantic output.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputToken {
    Application(String),
    Window(String),
    Label(String),
    Role(String),
    BoolValue(bool),
    IntValue(i64),
    FloatValue(f64),
    StringValue(String),
    UrlValue(String),
    PlaceholderValue(String),
    SelectedText(String),
    SelectedTextGrew(String),
    SelectedTextShrank(String),
    InsertedText(String),
    RemovedText(String),
    Help(String),
    UpdatedLabel(String),
    Edited,
    Selected,
    Unselected,
    Disabled,
    Entering,
    Exiting,
    Next,
    Previous,
    NoFocus,
    Boundary,
    RowCount(i64),
    ColumnCount(i64),
    SelectedChildrenCount(i64),
    CapsLockStatusChanged(bool),
    ApiDisabled,
    NotAccessible,
    Timeout,
}

impl OutputToken {
    /// Literal utterance for this token, or `None` for silent control tokens.
    pub fn render(&self) -> Option<String> {
        use OutputToken::*;
        Some(match self {
            Application(s) | Window(s) | Label(s) | Role(s) | StringValue(s)
            | UrlValue(s) | PlaceholderValue(s) | SelectedText(s) | SelectedTextGrew(s)
            | SelectedTextShrank(s) | InsertedText(s) | RemovedText(s) | Help(s)
            | UpdatedLabel(s) => s.clone(),
            BoolValue(true) => "On".to_string(),
            BoolValue(false) => "Off".to_string(),
            IntValue(i) => i.to_string(),
            FloatValue(f) => f.to_string(),
            CapsLockStatusChanged(true) => "CapsLock On".to_string(),
            CapsLockStatusChanged(false) => "CapsLock Off".to_string(),
            RowCount(n) => format!("{n} rows"),
            ColumnCount(n) => format!("{n} columns"),
            SelectedChildrenCount(1) => "1 selected child".to_string(),
            SelectedChildrenCount(n) => format!("{n} selected children"),
            NoFocus => "Nothing in focus".to_string(),
            NotAccessible => "Application not accessible".to_string(),
            Timeout => "Application is not responding".to_string(),
            ApiDisabled => "Accessibility interface disabled".to_string(),
            Disabled => "Disabled".to_string(),
            Edited => "Edited".to_string(),
            Entering => "Entering".to_string(),
            Exiting => "Exiting".to_string(),
            Selected => "Selected".to_string(),
            Unselected => "Unselected".to_string(),
            Boundary | Next | Previous => return None,
        })
    }
}

/// Render a token sequence to utterances, dropping silent control tokens.
pub fn render_all(tokens: &[OutputToken]) -> Vec<String> {
    tokens.iter().filter_map(OutputToken::render).collect()
}
