use std::path::PathBuf;

/// Inputs shared by every subcommand: a schema declaration and NDJSON data.
#[derive(Debug, Clone)]
pub struct Source {
    pub schema: PathBuf,
    pub data: PathBuf,
}

#[derive(Debug, Clone)]
pub enum Command {
    Query {
        source: Source,
        filter_json: Option<String>,
        /// Shorthand (`"-hits name"`) or a JSON mapping (`{"hits": -1}`).
        sort: Option<String>,
        skip: Option<usize>,
        limit: Option<usize>,
        select: Option<String>,
        lean: bool,
        explain: bool,
    },
    Validate {
        source: Source,
    },
}
