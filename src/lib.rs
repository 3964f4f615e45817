//! # vidscribe
//!
//! Turns a folder tree of lecture or tutorial videos into a searchable
//! transcript archive.
//!
//! vidscribe discovers video files, decodes and slices their audio into
//! fixed-length WAV chunks, transcribes every chunk with a speech
//! recognition service, and writes one `transcriptions.json` record per
//! run. The record can then be embedded into an exact vector index and
//! queried in natural language.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌─────────────┐   ┌──────────────────┐
//! │ Discover │──▶│  Audio   │──▶│ Transcriber │──▶│ transcriptions   │
//! │  videos  │   │ chunking │   │ (per chunk) │   │     .json        │
//! └──────────┘   └──────────┘   └─────────────┘   └────────┬─────────┘
//!                                                          │
//!                                ┌─────────────────────────┘
//!                                ▼
//!                        ┌──────────────┐   ┌──────────┐
//!                        │ Embed + Flat │──▶│  query   │
//!                        │    index     │   │ (top-k)  │
//!                        └──────────────┘   └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! vidscribe extract course.zip ./course
//! vidscribe process ./course ./work/audio ./work/text
//! vidscribe query --json-path ./transcriptions.json --query "installing dependencies"
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`discover`] | Video file discovery |
//! | [`archive`] | Zip extraction |
//! | [`audio`] | Audio decoding and chunking |
//! | [`transcribe`] | Speech recognizers and per-chunk transcription |
//! | [`store`] | Transcript record persistence |
//! | [`pipeline`] | The `process` state machine |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | Flat vector index and artifacts |
//! | [`search`] | Index build and query |
//! | [`progress`] | Progress reporting on stderr |

pub mod archive;
pub mod audio;
pub mod config;
pub mod discover;
pub mod embedding;
pub mod index;
pub mod models;
pub mod pipeline;
pub mod progress;
pub mod search;
pub mod store;
pub mod transcribe;
