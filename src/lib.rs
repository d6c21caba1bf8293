#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions, clippy::cast_precision_loss)]

pub mod clients;
pub mod config;
pub mod evaluation;
pub mod novelty;
pub mod observability;
pub mod recipe;
pub mod report;
pub mod util;
pub mod vocabulary;
