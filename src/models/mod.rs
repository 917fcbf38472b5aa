pub mod catalog;
pub mod provider;

pub use catalog::{
    CatalogRef, EpisodeMeta, GroupEntry, MediaKind, NumberingGroup, NumberingRequest,
    ResolvedNumbering, SeasonSummary, SeriesMetadata,
};
pub use provider::{
    Candidate, CandidateKind, EpisodeRef, StreamDescriptor, StreamInfo, SubtitleTrack,
};
