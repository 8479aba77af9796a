// xmemory engine: retrieval logic over the pure types in atoms/.

pub mod xmemory;
