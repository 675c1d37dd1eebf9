pub mod assembler;
pub mod budget;
pub mod checkpoint;
pub mod enricher;
pub mod extractor;
pub mod generator;
pub mod items;
pub mod orchestrator;
pub mod pipeline;
pub mod retry;
pub mod run_log;
pub mod scraper;
pub mod seo;
pub mod store;

#[cfg(test)]
pub mod testing;
