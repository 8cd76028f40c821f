//! Interpreter tests, driven through PostScript source

mod helpers;

mod colorspace_tests;
mod introspect_tests;
mod loop_tests;
mod runandhide_tests;
mod stopped_tests;
