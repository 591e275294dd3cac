//! Routing of server-pushed frames to application handlers.

use std::{
    collections::HashMap,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::Arc,
};

use tracing::warn;

use super::protocol::InboundFrame;

/// Error a command handler may return.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// A registered handler for one command name.
pub type CommandHandler = Arc<dyn Fn(&InboundFrame) -> Result<(), HandlerError> + Send + Sync>;

/// Outcome of offering a frame to the dispatcher.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dispatch {
    /// A handler ran to completion.
    Handled,
    /// A handler ran but returned an error or panicked.
    Failed,
    /// Nothing is registered under that command.
    Unknown,
}

/// Command name → handler registry.
#[derive(Default)]
pub struct CommandDispatcher {
    commands: HashMap<String, CommandHandler>,
}

impl CommandDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `name`, replacing any earlier one.
    pub fn add_command<F>(&mut self, name: impl Into<String>, handler: F)
    where
        F: Fn(&InboundFrame) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.register(name, Arc::new(handler));
    }

    /// Same as [`add_command`](Self::add_command) for an already shared handler.
    pub fn register(&mut self, name: impl Into<String>, handler: CommandHandler) {
        self.commands.insert(name.into(), handler);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Run the handler registered for `command` on `frame`.
    ///
    /// Each call is isolated: an error or panic is logged and reported as
    /// [`Dispatch::Failed`], never propagated.
    pub fn dispatch(&self, command: &str, frame: &InboundFrame) -> Dispatch {
        let Some(handler) = self.commands.get(command) else {
            return Dispatch::Unknown;
        };

        match catch_unwind(AssertUnwindSafe(|| handler(frame))) {
            Ok(Ok(())) => Dispatch::Handled,
            Ok(Err(e)) => {
                warn!(command, error = %e, "Command handler failed");
                Dispatch::Failed
            }
            Err(panic) => {
                let msg = panic.downcast_ref::<&str>().map_or_else(
                    || {
                        panic
                            .downcast_ref::<String>()
                            .map_or_else(|| "Unknown panic".to_string(), ToString::to_string)
                    },
                    ToString::to_string,
                );
                warn!(command, panic = %msg, "Command handler panicked");
                Dispatch::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn frame(command: &str) -> InboundFrame {
        InboundFrame::decode(&format!(r#"{{"_command":"{command}"}}"#)).unwrap()
    }

    fn counting(counter: &Arc<AtomicUsize>) -> CommandHandler {
        let counter = Arc::clone(counter);
        Arc::new(move |_frame: &InboundFrame| -> Result<(), HandlerError> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    #[test]
    fn test_dispatch_to_registered_handler() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut dispatcher = CommandDispatcher::new();
        dispatcher.register("spiderUpdated", counting(&hits));

        assert_eq!(
            dispatcher.dispatch("spiderUpdated", &frame("spiderUpdated")),
            Dispatch::Handled
        );
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unknown_command() {
        let dispatcher = CommandDispatcher::new();
        assert_eq!(dispatcher.dispatch("nope", &frame("nope")), Dispatch::Unknown);
    }

    #[test]
    fn test_later_registration_overwrites() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let mut dispatcher = CommandDispatcher::new();
        dispatcher.register("cmd", counting(&first));
        dispatcher.register("cmd", counting(&second));

        dispatcher.dispatch("cmd", &frame("cmd"));
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
        assert_eq!(dispatcher.len(), 1);
    }

    #[test]
    fn test_panicking_handler_is_isolated() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut dispatcher = CommandDispatcher::new();
        dispatcher.add_command("boom", |_frame| panic!("handler exploded"));
        dispatcher.register("ok", counting(&hits));

        assert_eq!(dispatcher.dispatch("boom", &frame("boom")), Dispatch::Failed);
        assert_eq!(dispatcher.dispatch("ok", &frame("ok")), Dispatch::Handled);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_erroring_handler_is_isolated() {
        let mut dispatcher = CommandDispatcher::new();
        dispatcher.add_command("bad", |_frame| Err("nope".into()));
        assert_eq!(dispatcher.dispatch("bad", &frame("bad")), Dispatch::Failed);
    }
}
