//! Record identifier generation

use uuid::Uuid;

/// Source of globally unique record identifiers.
pub trait IdGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// Random (v4) UUID identifiers.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn generate(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

/// Generate an identifier with the default generator.
pub fn generate_id() -> String {
    UuidGenerator.generate()
}
