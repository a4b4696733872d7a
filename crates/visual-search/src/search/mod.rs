pub mod ranker;

pub use ranker::{rank, similarity_percent, Candidate};
