// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Pure Rust structs and traits that define the core concepts
// of the system: drawings, bitmaps, samples, labels.
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO file I/O
//   - Only plain Rust structs, enums, and traits
//
// Reference: Rust Book §5 (Structs), §10 (Traits)

// A drawing record parsed from one corpus line
pub mod drawing;

// Bitmaps, samples and flattened batches
pub mod sample;

// Frozen label <-> id mapping
pub mod vocabulary;

// Core abstractions (traits) that other layers implement
pub mod traits;
