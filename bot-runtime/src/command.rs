//! Command table: name → handler for routing, scope → commands for remote registration.
//!
//! Populated during setup only; the runtime treats it as read-only once running.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use dbot_core::{BotCommand, CommandScope};

use crate::error::CommandError;
use crate::handler::Handler;

/// A bot command: unique name, description shown in the menu, handler, visibility and scopes.
#[derive(Clone)]
pub struct Command {
    pub name: String,
    pub description: String,
    /// Routable but left out of remote registration.
    pub hidden: bool,
    /// Registration scopes; empty means the unscoped bucket.
    pub scopes: Vec<CommandScope>,
    pub handler: Arc<dyn Handler>,
}

impl Command {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        handler: Arc<dyn Handler>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            hidden: false,
            scopes: Vec::new(),
            handler,
        }
    }

    /// Hides the command from the client's command menu.
    pub fn hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }

    pub fn with_scope(mut self, scope: CommandScope) -> Self {
        self.scopes.push(scope);
        self
    }

    pub fn with_scopes(mut self, scopes: impl IntoIterator<Item = CommandScope>) -> Self {
        self.scopes.extend(scopes);
        self
    }

    pub fn bot_command(&self) -> BotCommand {
        BotCommand::new(self.name.clone(), self.description.clone())
    }

    fn validate(&self) -> Result<(), CommandError> {
        if self.name.is_empty() {
            return Err(CommandError::EmptyName);
        }
        if self.description.is_empty() {
            return Err(CommandError::EmptyDescription(self.name.clone()));
        }
        Ok(())
    }

    /// Declared scopes in first-seen order without duplicates; the unscoped bucket when none.
    fn buckets(&self) -> Vec<CommandScope> {
        if self.scopes.is_empty() {
            return vec![CommandScope::unscoped()];
        }
        let mut seen = HashSet::new();
        self.scopes
            .iter()
            .filter(|scope| seen.insert(*scope))
            .cloned()
            .collect()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{} - {}", self.name, self.description)
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("hidden", &self.hidden)
            .field("scopes", &self.scopes)
            .finish_non_exhaustive()
    }
}

/// Registered commands, indexed by name and by scope.
#[derive(Default, Clone)]
pub struct CommandTable {
    by_name: HashMap<String, Arc<Command>>,
    by_scope: BTreeMap<CommandScope, Vec<Arc<Command>>>,
}

impl CommandTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds commands, all or nothing: the batch is validated (including duplicates within it)
    /// before any command is filed.
    pub fn try_add_commands(
        &mut self,
        commands: impl IntoIterator<Item = Command>,
    ) -> Result<(), CommandError> {
        let commands: Vec<Command> = commands.into_iter().collect();
        let mut batch = HashSet::new();
        for command in &commands {
            command.validate()?;
            if self.by_name.contains_key(&command.name) || !batch.insert(command.name.as_str()) {
                return Err(CommandError::Duplicate(command.name.clone()));
            }
        }

        for command in commands {
            let buckets = command.buckets();
            let command = Arc::new(command);
            for scope in buckets {
                self.by_scope
                    .entry(scope)
                    .or_default()
                    .push(Arc::clone(&command));
            }
            self.by_name.insert(command.name.clone(), command);
        }
        Ok(())
    }

    /// Adds commands during setup.
    ///
    /// # Panics
    /// On an empty name or description, or a name that is already registered.
    pub fn add_commands(&mut self, commands: impl IntoIterator<Item = Command>) {
        if let Err(e) = self.try_add_commands(commands) {
            panic!("{}", e);
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Command>> {
        self.by_name.get(name)
    }

    /// Scope → commands filed under it (hidden commands included).
    pub fn commands(&self) -> &BTreeMap<CommandScope, Vec<Arc<Command>>> {
        &self.by_scope
    }

    /// One entry per scope with at least one visible command, hidden commands removed.
    pub fn registrations(&self) -> Vec<(CommandScope, Vec<BotCommand>)> {
        self.by_scope
            .iter()
            .filter_map(|(scope, commands)| {
                let visible: Vec<BotCommand> = commands
                    .iter()
                    .filter(|c| !c.hidden)
                    .map(|c| c.bot_command())
                    .collect();
                (!visible.is_empty()).then(|| (scope.clone(), visible))
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::handler_fn;

    fn noop() -> Arc<dyn Handler> {
        handler_fn(|_ctx| Box::pin(async { Ok(()) }))
    }

    /// **Test: scopes {A, A, B} give exactly two buckets, each holding the command once.**
    #[test]
    fn test_duplicate_scopes_are_deduplicated() {
        let a = CommandScope::all_group_chats();
        let b = CommandScope::chat(100);
        let mut table = CommandTable::new();
        table.add_commands([Command::new("ping", "ping the bot", noop()).with_scopes([
            a.clone(),
            a.clone(),
            b.clone(),
        ])]);

        let buckets = table.commands();
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[&a].len(), 1);
        assert_eq!(buckets[&b].len(), 1);
        assert_eq!(buckets[&a][0].name, "ping");
    }

    #[test]
    fn test_unscoped_command_goes_to_unscoped_bucket() {
        let mut table = CommandTable::new();
        table.add_commands([Command::new("help", "show help", noop())]);

        let buckets = table.commands();
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[&CommandScope::unscoped()][0].name, "help");
        assert!(table.get("help").is_some());
        assert!(table.get("nope").is_none());
    }

    /// **Test: registering the same name twice panics regardless of description or handler.**
    #[test]
    #[should_panic(expected = "duplicate command name: ping")]
    fn test_duplicate_name_panics() {
        let mut table = CommandTable::new();
        table.add_commands([Command::new("ping", "first", noop())]);
        table.add_commands([Command::new("ping", "second, different", noop())]);
    }

    #[test]
    fn test_duplicate_within_batch_rejected_atomically() {
        let mut table = CommandTable::new();
        let err = table
            .try_add_commands([
                Command::new("a", "first", noop()),
                Command::new("b", "second", noop()),
                Command::new("a", "third", noop()),
            ])
            .unwrap_err();
        assert_eq!(err, CommandError::Duplicate("a".to_string()));
        assert!(table.is_empty(), "nothing from a rejected batch is filed");
    }

    #[test]
    #[should_panic(expected = "command name must be non-empty")]
    fn test_empty_name_panics() {
        CommandTable::new().add_commands([Command::new("", "desc", noop())]);
    }

    #[test]
    fn test_empty_description_rejected() {
        let err = CommandTable::new()
            .try_add_commands([Command::new("x", "", noop())])
            .unwrap_err();
        assert_eq!(err, CommandError::EmptyDescription("x".to_string()));
    }

    /// **Test: hidden commands stay routable but are left out of registrations; empty buckets are skipped.**
    #[test]
    fn test_registrations_skip_hidden_and_empty_buckets() {
        let group = CommandScope::all_group_chats();
        let mut table = CommandTable::new();
        table.add_commands([
            Command::new("secret", "hidden one", noop())
                .hidden(true)
                .with_scope(group.clone()),
            Command::new("start", "start", noop()),
            Command::new("stop", "stop", noop()),
        ]);

        assert!(table.get("secret").is_some());
        let registrations = table.registrations();
        assert_eq!(registrations.len(), 1);
        let (scope, commands) = &registrations[0];
        assert_eq!(scope, &CommandScope::unscoped());
        assert_eq!(
            commands,
            &vec![BotCommand::new("start", "start"), BotCommand::new("stop", "stop")]
        );
    }

    #[test]
    fn test_display() {
        let cmd = Command::new("ping", "ping the bot", noop());
        assert_eq!(cmd.to_string(), "/ping - ping the bot");
    }
}
