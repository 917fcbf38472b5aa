pub mod cache;
pub mod cleanup;
pub mod host_guard;
pub mod luluvid;
pub mod matcher;
pub mod metadata;
pub mod metrics;
pub mod normalize;
pub mod numbering;
pub mod overrides;
pub mod playlist;
pub mod providers;
pub mod ranker;
pub mod redis;
pub mod resolver;
pub mod search;

#[cfg(test)]
pub mod testing;
