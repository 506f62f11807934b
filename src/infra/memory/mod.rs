// In-memory collaborators for exercising the pipeline without Google.
// They implement the same ports as the Google stores and record what was
// asked of them so tests can assert on it.

mod fake_generator;
mod memory_drive;
mod memory_ledger;

pub use fake_generator::FakeGenerator;
pub use memory_drive::MemoryDrive;
pub use memory_ledger::MemoryLedger;
