//! Prefix-key input routing
//!
//! Every byte headed for the focused PTY passes through here first. A
//! two-state machine recognizes the Ctrl+\ prefix and turns the following
//! byte into a multiplexer command; everything else is forwarded verbatim.
//! Transitions have no side effects: the caller executes the returned
//! [`Action`].

/// Ctrl+\ — rarely bound by shells or full-screen programs.
pub const PREFIX_BYTE: u8 = 0x1c;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RouterState {
    Normal,
    PrefixPending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Pass these bytes through to the focused PTY untouched.
    Forward(Vec<u8>),
    Command(Command),
    /// Swallowed byte: the prefix itself, or an unrecognized command byte.
    Ignore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    NewSession,
    DeleteSession,
    /// Focus the nth session in display order, 1-based.
    Focus(usize),
    ToggleOverview,
    Quit,
}

pub struct InputRouter {
    state: RouterState,
}

impl InputRouter {
    pub fn new() -> Self {
        Self {
            state: RouterState::Normal,
        }
    }

    /// True while the prefix has been pressed and a command byte is awaited.
    /// The hint bar highlights in this state.
    pub fn prefix_armed(&self) -> bool {
        self.state == RouterState::PrefixPending
    }

    /// Drop a pending prefix, e.g. when focus changes underneath it.
    pub fn reset(&mut self) {
        self.state = RouterState::Normal;
    }

    /// Route one encoded key's worth of bytes.
    ///
    /// Multi-byte sequences (arrows, function keys) arrive as a unit from the
    /// keymapper; only a lone prefix byte arms the machine, so escape
    /// sequences can never be split by command handling.
    pub fn route(&mut self, bytes: &[u8]) -> Action {
        match self.state {
            RouterState::Normal => {
                if bytes == [PREFIX_BYTE] {
                    self.state = RouterState::PrefixPending;
                    Action::Ignore
                } else {
                    Action::Forward(bytes.to_vec())
                }
            }
            RouterState::PrefixPending => {
                self.state = RouterState::Normal;
                match bytes {
                    [b'n'] => Action::Command(Command::NewSession),
                    [b'd'] => Action::Command(Command::DeleteSession),
                    [b'o'] => Action::Command(Command::ToggleOverview),
                    [b'q'] => Action::Command(Command::Quit),
                    [d @ b'1'..=b'9'] => Action::Command(Command::Focus((d - b'0') as usize)),
                    _ => Action::Ignore,
                }
            }
        }
    }
}

impl Default for InputRouter {
    fn default() -> Self {
        Self::new()
    }
}
