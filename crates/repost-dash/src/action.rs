//! Action enum: all user-initiated intents.

use crate::control::Command;
use crate::engine::Notice;

/// Unique identifier for a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentId {
    Header,
    Progress,
    PostConfig,
    Channels,
    Logs,
    HelpOverlay,
}

/// What a one-line prompt is collecting.  The submitted text is turned into
/// an [`Action`] by the App.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptKind {
    TemplateText,
    ButtonLabel,
    ButtonUrl,
    DelayMin,
    DelayMax,
    StockChannel,
    AddDestination,
    /// Rename the destination currently holding this id.
    RenameDestination(String),
    ImportPath,
}

impl PromptKind {
    pub fn title(&self) -> &'static str {
        match self {
            PromptKind::TemplateText => "template",
            PromptKind::ButtonLabel => "button label",
            PromptKind::ButtonUrl => "button url",
            PromptKind::DelayMin => "min delay (e.g. 90, 15m, 2h)",
            PromptKind::DelayMax => "max delay (e.g. 90, 15m, 2h)",
            PromptKind::StockChannel => "stock channel: <id> [name]",
            PromptKind::AddDestination => "add destination: <id> [name]",
            PromptKind::RenameDestination(_) => "rename destination: <id> [name]",
            PromptKind::ImportPath => "import backup from path",
        }
    }
}

/// All actions that can flow through the system.
/// Components produce Actions; the App dispatches them.
#[derive(Debug, Clone)]
pub enum Action {
    // ── Navigation ───────────────────────────────────────────────────────────
    FocusNext,
    FocusPrev,
    FocusPane(ComponentId),

    // ── Operator ─────────────────────────────────────────────────────────────
    /// Validate and send a command to the backend.
    Run(Command),
    /// Ask y/n before running `command`.
    Confirm { question: String, command: Command },
    /// Open the one-line prompt, pre-filled with `initial`.
    Prompt { kind: PromptKind, initial: String },
    /// Show a notice without touching the backend.
    Notify(Notice),

    // ── UI toggles ───────────────────────────────────────────────────────────
    ToggleHelp,
    ToggleKeys,

    // ── System ───────────────────────────────────────────────────────────────
    Quit,
    Noop,
}
