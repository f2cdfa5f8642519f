//! Command registry: validates plugins at startup and resolves names and
//! aliases.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use crate::bot::command::{Capabilities, Command, CommandDescriptor};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("command '{0}' is already registered")]
    DuplicateName(String),
    #[error("alias '{alias}' of '{command}' is already taken by '{existing}'")]
    DuplicateAlias { alias: String, command: String, existing: String },
    #[error("invalid command descriptor: {0}")]
    InvalidDescriptor(String),
}

/// A validated command with its effective cooldown.
pub struct RegisteredCommand {
    /// Normalized: lowercase name and aliases.
    pub descriptor: CommandDescriptor,
    pub cooldown: Duration,
    pub capabilities: Capabilities,
    pub handler: Arc<dyn Command>,
}

impl RegisteredCommand {
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }
}

/// Commands indexed by name and alias, kept in registration order.
pub struct CommandRegistry {
    commands: Vec<Arc<RegisteredCommand>>,
    by_name: HashMap<String, usize>,
    /// alias → canonical name
    aliases: HashMap<String, String>,
    default_cooldown: Duration,
    cooldown_overrides: HashMap<String, Duration>,
}

fn normalize_token(token: &str, what: &str) -> Result<String, RegistryError> {
    let token = token.trim().to_lowercase();
    if token.is_empty() {
        return Err(RegistryError::InvalidDescriptor(format!("{what} is empty")));
    }
    if token.chars().any(char::is_whitespace) {
        return Err(RegistryError::InvalidDescriptor(format!("{what} '{token}' contains whitespace")));
    }
    Ok(token)
}

impl CommandRegistry {
    /// `cooldown_overrides` keys must already be lowercase.
    pub fn new(default_cooldown: Duration, cooldown_overrides: HashMap<String, Duration>) -> Self {
        Self {
            commands: Vec::new(),
            by_name: HashMap::new(),
            aliases: HashMap::new(),
            default_cooldown,
            cooldown_overrides,
        }
    }

    /// Register every candidate, skipping invalid ones with a warning.
    pub fn load(
        candidates: Vec<Arc<dyn Command>>,
        default_cooldown: Duration,
        cooldown_overrides: HashMap<String, Duration>,
    ) -> Self {
        let mut registry = Self::new(default_cooldown, cooldown_overrides);
        for candidate in candidates {
            if let Err(e) = registry.register(candidate) {
                warn!("Skipping command plugin: {e}");
            }
        }
        info!("Loaded {} commands, {} aliases", registry.commands.len(), registry.aliases.len());
        registry
    }

    pub fn register(&mut self, handler: Arc<dyn Command>) -> Result<(), RegistryError> {
        let mut descriptor = handler.descriptor();
        let capabilities = handler.capabilities();

        let name = normalize_token(&descriptor.name, "command name")?;
        if self.by_name.contains_key(&name) || self.aliases.contains_key(&name) {
            return Err(RegistryError::DuplicateName(name));
        }

        let mut aliases = Vec::new();
        for alias in &descriptor.aliases {
            let alias = normalize_token(alias, "alias")?;
            if alias == name || aliases.contains(&alias) {
                continue;
            }
            let existing = self
                .by_name
                .get_key_value(&alias)
                .map(|(n, _)| n.clone())
                .or_else(|| self.aliases.get(&alias).cloned());
            if let Some(existing) = existing {
                return Err(RegistryError::DuplicateAlias { alias, command: name, existing });
            }
            aliases.push(alias);
        }

        let cooldown = self
            .cooldown_overrides
            .get(&name)
            .copied()
            .or(descriptor.cooldown)
            .unwrap_or(self.default_cooldown);

        descriptor.name = name.clone();
        descriptor.aliases = aliases.clone();

        for alias in aliases {
            self.aliases.insert(alias, name.clone());
        }
        self.by_name.insert(name, self.commands.len());
        self.commands.push(Arc::new(RegisteredCommand { descriptor, cooldown, capabilities, handler }));
        Ok(())
    }

    /// Resolve a command token: direct name first, then alias.
    pub fn resolve(&self, token: &str) -> Option<Arc<RegisteredCommand>> {
        let token = token.to_lowercase();
        let name = self.aliases.get(&token).unwrap_or(&token);
        self.by_name.get(name).map(|&i| self.commands[i].clone())
    }

    /// All commands in registration order.
    pub fn all_commands(&self) -> impl Iterator<Item = &Arc<RegisteredCommand>> {
        self.commands.iter()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::bot::command::CommandContext;

    struct Stub(CommandDescriptor);

    #[async_trait]
    impl Command for Stub {
        fn descriptor(&self) -> CommandDescriptor {
            self.0.clone()
        }

        fn capabilities(&self) -> Capabilities {
            Capabilities { start: true, ..Default::default() }
        }

        async fn start(&self, _ctx: CommandContext) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn stub(descriptor: CommandDescriptor) -> Arc<dyn Command> {
        Arc::new(Stub(descriptor))
    }

    fn registry() -> CommandRegistry {
        CommandRegistry::new(Duration::from_secs(3), HashMap::new())
    }

    #[test]
    fn test_alias_resolves_to_canonical_command() {
        let mut reg = registry();
        reg.register(stub(CommandDescriptor::new("pic").alias("pin"))).unwrap();

        let by_name = reg.resolve("pic").unwrap();
        let by_alias = reg.resolve("pin").unwrap();
        assert!(Arc::ptr_eq(&by_name, &by_alias));
        assert_eq!(by_alias.name(), "pic");
    }

    #[test]
    fn test_resolve_is_case_insensitive() {
        let mut reg = registry();
        reg.register(stub(CommandDescriptor::new("Pic").alias("PIN"))).unwrap();
        assert_eq!(reg.resolve("PIC").unwrap().name(), "pic");
        assert_eq!(reg.resolve("pIn").unwrap().name(), "pic");
    }

    #[test]
    fn test_unknown_token_not_found() {
        let mut reg = registry();
        reg.register(stub(CommandDescriptor::new("pic"))).unwrap();
        assert!(reg.resolve("nope").is_none());
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut reg = registry();
        reg.register(stub(CommandDescriptor::new("pic"))).unwrap();
        let err = reg.register(stub(CommandDescriptor::new("PIC"))).unwrap_err();
        assert_eq!(err, RegistryError::DuplicateName("pic".to_string()));
    }

    #[test]
    fn test_name_colliding_with_alias_rejected() {
        let mut reg = registry();
        reg.register(stub(CommandDescriptor::new("pic").alias("pin"))).unwrap();
        assert!(matches!(
            reg.register(stub(CommandDescriptor::new("pin"))),
            Err(RegistryError::DuplicateName(_))
        ));
    }

    #[test]
    fn test_alias_colliding_with_name_rejected() {
        let mut reg = registry();
        reg.register(stub(CommandDescriptor::new("pic"))).unwrap();
        let err = reg.register(stub(CommandDescriptor::new("image").alias("pic"))).unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateAlias { ref existing, .. } if existing == "pic"));
        // The failed registration left nothing behind.
        assert!(reg.resolve("image").is_none());
    }

    #[test]
    fn test_load_skips_malformed_plugins() {
        let reg = CommandRegistry::load(
            vec![
                stub(CommandDescriptor::new("")),
                stub(CommandDescriptor::new("two words")),
                stub(CommandDescriptor::new("ok")),
                stub(CommandDescriptor::new("ok")),
            ],
            Duration::from_secs(3),
            HashMap::new(),
        );
        assert_eq!(reg.len(), 1);
        assert!(reg.resolve("ok").is_some());
    }

    #[test]
    fn test_all_commands_in_load_order() {
        let reg = CommandRegistry::load(
            vec![
                stub(CommandDescriptor::new("b")),
                stub(CommandDescriptor::new("a")),
                stub(CommandDescriptor::new("c")),
            ],
            Duration::from_secs(3),
            HashMap::new(),
        );
        let names: Vec<&str> = reg.all_commands().map(|c| c.name()).collect();
        assert_eq!(names, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_cooldown_precedence() {
        let overrides = HashMap::from([("slow".to_string(), Duration::from_secs(60))]);
        let mut reg = CommandRegistry::new(Duration::from_secs(3), overrides);
        reg.register(stub(CommandDescriptor::new("plain"))).unwrap();
        reg.register(stub(CommandDescriptor::new("own").cooldown_secs(20))).unwrap();
        reg.register(stub(CommandDescriptor::new("slow").cooldown_secs(20))).unwrap();

        assert_eq!(reg.resolve("plain").unwrap().cooldown, Duration::from_secs(3));
        assert_eq!(reg.resolve("own").unwrap().cooldown, Duration::from_secs(20));
        assert_eq!(reg.resolve("slow").unwrap().cooldown, Duration::from_secs(60));
    }
}
