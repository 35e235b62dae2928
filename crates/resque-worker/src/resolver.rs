use std::collections::HashMap;

use resque_core::CoreError;
use serde_json::Value;

/// An object the job class resolver hands back for a given class name:
/// given the job's argument list, run the job and return its result
/// verbatim (spec §4.B, §6).
pub trait Perform: Send {
    fn perform(&mut self, args: Vec<Value>) -> Result<Value, Box<dyn std::error::Error + Send + Sync>>;
}

/// External collaborator contract (spec §6): given a class name,
/// produce a `Perform`-able instance.
pub trait JobClassResolver: Send + Sync {
    fn resolve(&self, class: &str) -> Result<Box<dyn Perform>, CoreError>;
}

type Factory = Box<dyn Fn() -> Box<dyn Perform> + Send + Sync>;

/// Explicit registry mapping class name to constructor (spec §9 Design
/// Note: "Replace late-binding class lookup with an explicit registry
/// mapping class name -> constructor/closure").
#[derive(Default)]
pub struct JobClassRegistry {
    factories: HashMap<String, Factory>,
}

impl JobClassRegistry {
    pub fn new() -> Self {
        JobClassRegistry {
            factories: HashMap::new(),
        }
    }

    pub fn register<F, P>(&mut self, class: impl Into<String>, factory: F)
    where
        F: Fn() -> P + Send + Sync + 'static,
        P: Perform + 'static,
    {
        self.factories
            .insert(class.into(), Box::new(move || Box::new(factory())));
    }
}

impl JobClassResolver for JobClassRegistry {
    fn resolve(&self, class: &str) -> Result<Box<dyn Perform>, CoreError> {
        self.factories
            .get(class)
            .map(|factory| factory())
            .ok_or_else(|| CoreError::UnknownJobClass(class.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;
    impl Perform for Echo {
        fn perform(&mut self, args: Vec<Value>) -> Result<Value, Box<dyn std::error::Error + Send + Sync>> {
            Ok(Value::Array(args))
        }
    }

    #[test]
    fn resolves_registered_class() {
        let mut registry = JobClassRegistry::new();
        registry.register("Echo", || Echo);
        let mut instance = registry.resolve("Echo").unwrap();
        let result = instance.perform(vec![Value::String("hi".into())]).unwrap();
        assert_eq!(result, Value::Array(vec![Value::String("hi".into())]));
    }

    #[test]
    fn unknown_class_is_an_error() {
        let registry = JobClassRegistry::new();
        assert!(matches!(
            registry.resolve("Nope"),
            Err(CoreError::UnknownJobClass(_))
        ));
    }
}
