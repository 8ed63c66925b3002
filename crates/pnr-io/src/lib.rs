//! # pnr io
//!
//! Readers for the import formats (LEF technology and cell geometry,
//! Liberty timing, structural Verilog), JSON design snapshots, a DEF
//! writer and the project file driving a batch flow run.

pub mod def;
pub mod lef;
pub mod liberty;
pub mod project;
pub mod snapshot;
pub mod verilog;

pub use def::{write_def, write_def_file};
pub use lef::{read_cells, read_technology, LefError};
pub use liberty::read_liberty;
pub use project::{FloorplanConfig, OutputConfig, ProjectConfig};
pub use snapshot::{load_design, read_snapshot, write_snapshot};
pub use verilog::{read_verilog, select_top, write_verilog, write_verilog_file};
