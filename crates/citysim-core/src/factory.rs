//! Dynamic subsystem construction from configuration.

use std::collections::HashMap;

use crate::error::ConfigError;
use crate::kernel::SubsystemConfig;
use crate::subsystem::Subsystem;

type Constructor = Box<dyn Fn(&SubsystemConfig) -> Box<dyn Subsystem> + Send + Sync>;

/// A registry mapping a subsystem `type` tag to a constructor closure.
///
/// Populated at program start (typically by `citysim_subsystems::register_all`)
/// and consulted by [`crate::Kernel::bootstrap`] to turn each
/// [`SubsystemConfig`] into a running worker without the kernel needing to
/// know about any concrete subsystem type.
#[derive(Default)]
pub struct SubsystemFactory {
    constructors: HashMap<String, Constructor>,
}

impl SubsystemFactory {
    /// Create an empty factory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constructor for subsystems tagged `type_tag`.
    ///
    /// Replaces any previously registered constructor for the same tag.
    pub fn register(
        &mut self,
        type_tag: impl Into<String>,
        constructor: impl Fn(&SubsystemConfig) -> Box<dyn Subsystem> + Send + Sync + 'static,
    ) {
        self.constructors
            .insert(type_tag.into(), Box::new(constructor));
    }

    /// Build a subsystem instance from `config`, dispatching on its
    /// `type_tag`.
    pub fn build(&self, config: &SubsystemConfig) -> Result<Box<dyn Subsystem>, ConfigError> {
        let constructor =
            self.constructors
                .get(&config.type_tag)
                .ok_or_else(|| ConfigError::UnknownSubsystemType {
                    type_tag: config.type_tag.clone(),
                })?;
        Ok(constructor(config))
    }

    /// Whether `type_tag` has a registered constructor.
    pub fn contains(&self, type_tag: &str) -> bool {
        self.constructors.contains_key(type_tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subsystem::SubsystemContext;
    use std::collections::HashMap as StdHashMap;

    struct NoopSubsystem;
    impl Subsystem for NoopSubsystem {
        fn execute_tick(&mut self, _ctx: &SubsystemContext<'_>) {}
    }

    fn config(type_tag: &str) -> SubsystemConfig {
        SubsystemConfig {
            type_tag: type_tag.to_string(),
            thread_name: type_tag.to_string(),
            params: StdHashMap::new(),
        }
    }

    #[test]
    fn build_unknown_type_errors() {
        let factory = SubsystemFactory::new();
        let err = factory.build(&config("nonexistent"));
        assert_eq!(
            err.err(),
            Some(ConfigError::UnknownSubsystemType {
                type_tag: "nonexistent".to_string()
            })
        );
    }

    #[test]
    fn build_registered_type_succeeds() {
        let mut factory = SubsystemFactory::new();
        factory.register("noop", |_cfg| Box::new(NoopSubsystem));
        assert!(factory.contains("noop"));
        assert!(factory.build(&config("noop")).is_ok());
    }

    #[test]
    fn register_overwrites_previous_constructor() {
        let mut factory = SubsystemFactory::new();
        factory.register("noop", |_cfg| Box::new(NoopSubsystem));
        factory.register("noop", |_cfg| Box::new(NoopSubsystem));
        assert!(factory.build(&config("noop")).is_ok());
    }
}
