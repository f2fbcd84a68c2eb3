//! Integration tests: full runs against in-memory sources and a temp
//! artifact directory.

mod mock_source;
mod pipeline;
