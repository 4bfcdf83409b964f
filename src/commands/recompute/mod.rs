mod pass;
mod run;

pub use run::run;
