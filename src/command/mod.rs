// Command channel: chunk reassembly and the JSON command vocabulary

pub mod chunk;
pub mod interpreter;

pub use chunk::{split_into_envelopes, ChunkAssembler};
pub use interpreter::CommandInterpreter;
