//! # folksync-connectors
//!
//! Built-in sources and sinks, and the name → constructor tables the CLI
//! uses to build them from a config file.
//!
//! | name | kind | module |
//! |---|---|---|
//! | `file` | source | [`file_source`] |
//! | `file` | sink | [`file_sink`] |
//! | `null` | sink | [`null_sink`] |

pub mod file_sink;
pub mod file_source;
pub mod null_sink;
pub mod registry;

pub use file_sink::FileSink;
pub use file_source::FileSource;
pub use null_sink::NullSink;
pub use registry::{build_cache, build_sink, build_sinks, build_source, SINKS, SOURCES};
