//! Retrieval-augmented generation over PDF and text documents.
//!
//! The pipeline runs in five steps, each one a module:
//!
//! 1. **load**: [`document`] extracts text from PDFs and text files
//! 2. **chunk**: [`chunking`] splits text into overlapping windows
//! 3. **embed**: [`embeddings`] and [`gemini`] turn chunks into vectors
//! 4. **store**: [`database`] keeps vectors in a Qdrant collection
//! 5. **query**: [`rag`] retrieves the nearest chunks and asks the model
//!
//! Every step except chunking delegates to an external service.

pub mod chunking;
pub mod config;
pub mod database;
pub mod document;
pub mod embeddings;
pub mod gemini;
pub mod generation;
pub mod rag;
