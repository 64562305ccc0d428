pub mod evaluators;
pub mod history;
pub mod orchestrator;
pub mod packet;
pub mod spec;
pub mod subst;
pub mod tasks;
pub mod vars;
