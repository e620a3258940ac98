// Armature Body - concurrency-serializing response body writer
//
// Lets response code keep writing while earlier flushes are still draining,
// without ever handing the underlying sink more than one logical writer.

// Re-export the write pipeline
pub use armature_pipe::*;

/// Prelude for common imports.
///
/// ```
/// use armature_body::prelude::*;
/// ```
pub mod prelude {
    pub use armature_pipe::prelude::*;
}
