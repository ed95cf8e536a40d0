pub mod acquire;
pub mod dedup;
pub mod dimensions;
pub mod enrich;
pub mod expand;
pub mod fanout;
pub mod guard;
pub mod normalize;
pub mod registry;
pub mod report;
pub mod run;
pub mod scoring;
