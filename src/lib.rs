//! Compiles annotated TwinCAT controller-project XML into EPICS record and
//! archive-descriptor output.
//!
//! The pipeline runs strictly left to right: [`xml_obj`] builds a generic
//! tagged tree over the raw project XML, [`types`] reconstructs the typed
//! symbol/datatype graph on top of it, [`chain`] walks that graph into
//! pragma-bearing chains, [`merge`] folds each chain's pragma levels into a
//! [`merge::Configuration`], [`record`] turns each configuration into one or
//! more record packages, [`lint`] checks them against a record-definition
//! grammar, and [`render`] writes the final text. [`project`] and [`cli`]
//! wire the whole thing to the command line.

pub mod chain;
pub mod cli;
pub mod diag;
pub mod error;
pub mod lint;
pub mod merge;
pub mod pragma;
pub mod project;
pub mod record;
pub mod render;
pub mod types;
pub mod xml_obj;
