//! Build action assembly, aggregation, and emission.

pub mod aggregate;
pub mod assemble;
pub mod emit;
pub mod statement;

pub use aggregate::aggregate_statements;
pub use assemble::{
    module_phonies, AssembledModule, Assembler, InstallEntry, KeyPair, ModuleOutputs,
};
pub use statement::{ActionSet, BuildStatement, Rule};
