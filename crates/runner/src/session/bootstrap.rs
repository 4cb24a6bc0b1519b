//! Multiplexer bootstrap state machine.
//!
//! Multiplexer startup is deferred until the user presses Enter for the
//! first time, so the shell finishes starting and the welcome banner stays
//! visible. The machine is a pure function of `(state, event)`; the
//! dispatcher performs the returned actions in order.
//!
//! ```text
//! NotStarted --Input("\r")--> Starting --SessionProbed--> Started
//! ```

/// Bootstrap progress of one session. `Started` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BootstrapState {
    /// No carriage return seen yet.
    #[default]
    NotStarted,
    /// The attach-or-create sequence is in progress.
    Starting,
    /// The multiplexer command line has been typed into the shell.
    Started,
}

impl BootstrapState {
    /// Returns true once multiplexer control messages are accepted.
    pub fn is_started(self) -> bool {
        self == BootstrapState::Started
    }
}

/// Inputs to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapEvent<'a> {
    /// An `input` frame arrived.
    Input(&'a str),
    /// The existence query for the named session completed.
    SessionProbed { exists: bool },
}

/// Side effects requested by a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapAction {
    /// Write the bytes verbatim to the process input.
    Forward(String),
    /// Erase the current input line.
    ClearLine,
    /// Ask the multiplexer whether the named session exists and feed the
    /// answer back as [`BootstrapEvent::SessionProbed`].
    ProbeSession,
    /// Type the attach command line into the shell.
    AttachSession,
    /// Type the new-session command line into the shell.
    CreateSession,
}

/// The keystroke that triggers the bootstrap.
pub const CARRIAGE_RETURN: &str = "\r";

/// Computes the next state and the actions to run for an event.
pub fn transition(
    state: BootstrapState,
    event: BootstrapEvent<'_>,
) -> (BootstrapState, Vec<BootstrapAction>) {
    use BootstrapAction::*;
    use BootstrapState::*;

    match (state, event) {
        (NotStarted, BootstrapEvent::Input(CARRIAGE_RETURN)) => {
            (Starting, vec![ClearLine, ProbeSession])
        }
        (state, BootstrapEvent::Input(data)) => (state, vec![Forward(data.to_string())]),
        (Starting, BootstrapEvent::SessionProbed { exists: true }) => (Started, vec![AttachSession]),
        (Starting, BootstrapEvent::SessionProbed { exists: false }) => {
            (Started, vec![CreateSession])
        }
        // A probe answer outside `Starting` is stale.
        (state, BootstrapEvent::SessionProbed { .. }) => (state, Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use BootstrapAction::*;
    use BootstrapState::*;

    #[test]
    fn test_default_is_not_started() {
        assert_eq!(BootstrapState::default(), NotStarted);
        assert!(!NotStarted.is_started());
        assert!(!Starting.is_started());
        assert!(Started.is_started());
    }

    #[test]
    fn test_carriage_return_starts_bootstrap() {
        let (state, actions) = transition(NotStarted, BootstrapEvent::Input("\r"));
        assert_eq!(state, Starting);
        assert_eq!(actions, vec![ClearLine, ProbeSession]);
    }

    #[test]
    fn test_other_input_forwarded_before_bootstrap() {
        for data in ["l", "ls", "ls\r", "\n", "\r\n", ""] {
            let (state, actions) = transition(NotStarted, BootstrapEvent::Input(data));
            assert_eq!(state, NotStarted, "input {data:?}");
            assert_eq!(actions, vec![Forward(data.to_string())]);
        }
    }

    #[test]
    fn test_probe_selects_attach_or_create() {
        let (state, actions) = transition(Starting, BootstrapEvent::SessionProbed { exists: true });
        assert_eq!(state, Started);
        assert_eq!(actions, vec![AttachSession]);

        let (state, actions) =
            transition(Starting, BootstrapEvent::SessionProbed { exists: false });
        assert_eq!(state, Started);
        assert_eq!(actions, vec![CreateSession]);
    }

    #[test]
    fn test_started_forwards_carriage_return() {
        let (state, actions) = transition(Started, BootstrapEvent::Input("\r"));
        assert_eq!(state, Started);
        assert_eq!(actions, vec![Forward("\r".to_string())]);
    }

    #[test]
    fn test_stale_probe_ignored() {
        for state in [NotStarted, Started] {
            let (next, actions) = transition(state, BootstrapEvent::SessionProbed { exists: true });
            assert_eq!(next, state);
            assert!(actions.is_empty());
        }
    }

    #[test]
    fn test_leaves_not_started_exactly_once() {
        let inputs = ["e", "c", "\r", "\r", "x", "\r"];
        let mut state = NotStarted;
        let mut bootstraps = 0;

        for input in inputs {
            let (next, actions) = transition(state, BootstrapEvent::Input(input));
            if actions.contains(&ProbeSession) {
                bootstraps += 1;
                let (after_probe, _) =
                    transition(next, BootstrapEvent::SessionProbed { exists: false });
                state = after_probe;
            } else {
                state = next;
            }
        }

        assert_eq!(bootstraps, 1);
        assert_eq!(state, Started);
    }
}
