//! Takeoff - quantity takeoff extraction and reconciliation for construction
//! bid documents.
//!
//! Reads a set of bid PDFs, picks the documents most likely to carry
//! quantities, recovers page text (natively or by OCR), discovers equipment
//! and sign type codes, counts them from independent sources and reconciles
//! those counts into one estimate per code and a takeoff table per category.

pub mod config;
pub mod llm;
pub mod models;
pub mod ocr;
pub mod services;
pub mod vector;
