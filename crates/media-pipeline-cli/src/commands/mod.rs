pub mod pipelines;
pub mod plugins;
pub mod registry_helper;
pub mod run;
pub mod stream;
pub mod validate;
