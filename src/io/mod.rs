//! I/O utilities for exporting engine results.

pub mod export;
