mod harness;

pub use harness::{AfterReply, Script, ScriptedServer};
