//! Command handlers, one module per subcommand.

pub(crate) mod run;
pub(crate) mod score;
pub(crate) mod validate;
