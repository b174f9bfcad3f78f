use crate::types::{AppError, Result, ToolCall, ToolDefinition};
use serde_json::{json, Value};

/// Hard ceiling on URLs accepted by a single `web_fetch` call.
pub const MAX_FETCH_URLS: usize = 5;

/// The closed set of capabilities a worker may invoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Search,
    Fetch,
}

impl Capability {
    pub const ALL: [Capability; 2] = [Capability::Search, Capability::Fetch];

    pub fn name(&self) -> &'static str {
        match self {
            Capability::Search => "web_search",
            Capability::Fetch => "web_fetch",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }

    pub fn description(&self) -> &'static str {
        match self {
            Capability::Search => {
                "Search the web. Returns a list of results with title, url and a short snippet."
            }
            Capability::Fetch => {
                "Fetch one or more web pages and return their readable text. Use after \
                 web_search to read the most promising results in full."
            }
        }
    }

    pub fn parameters_schema(&self) -> Value {
        match self {
            Capability::Search => json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "The search query"
                    },
                    "max_results": {
                        "type": "integer",
                        "description": "Maximum number of results to return",
                        "minimum": 1,
                        "maximum": 10
                    }
                },
                "required": ["query"]
            }),
            Capability::Fetch => json!({
                "type": "object",
                "properties": {
                    "url": {
                        "type": "string",
                        "description": "A single URL to fetch"
                    },
                    "urls": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "Several URLs to fetch at once"
                    }
                }
            }),
        }
    }

    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// Tool schemas offered to worker models, in a stable order.
pub fn capability_definitions() -> Vec<ToolDefinition> {
    Capability::ALL.iter().map(Capability::definition).collect()
}

/// A model tool call parsed into one of the known capabilities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestedAction {
    Search {
        query: String,
        max_results: Option<usize>,
    },
    Fetch {
        urls: Vec<String>,
    },
}

impl TryFrom<&ToolCall> for RequestedAction {
    type Error = AppError;

    fn try_from(call: &ToolCall) -> Result<Self> {
        let capability = Capability::from_name(&call.name)
            .ok_or_else(|| AppError::InvalidInput(format!("Unknown tool: {}", call.name)))?;
        let args = &call.arguments;

        match capability {
            Capability::Search => {
                let query = args
                    .get("query")
                    .and_then(|v| v.as_str())
                    .map(str::trim)
                    .filter(|q| !q.is_empty())
                    .ok_or_else(|| {
                        AppError::InvalidInput("Missing 'query' parameter".to_string())
                    })?;
                let max_results = args
                    .get("max_results")
                    .or_else(|| args.get("num_results"))
                    .and_then(|v| v.as_u64())
                    .map(|n| n as usize);
                Ok(RequestedAction::Search {
                    query: query.to_string(),
                    max_results,
                })
            }
            Capability::Fetch => {
                let mut urls: Vec<String> = Vec::new();
                if let Some(url) = args.get("url").and_then(|v| v.as_str()) {
                    urls.push(url.trim().to_string());
                }
                if let Some(list) = args.get("urls").and_then(|v| v.as_array()) {
                    urls.extend(
                        list.iter()
                            .filter_map(|v| v.as_str())
                            .map(|u| u.trim().to_string()),
                    );
                }
                urls.retain(|u| !u.is_empty());
                urls.dedup();
                if urls.is_empty() {
                    return Err(AppError::InvalidInput(
                        "Missing 'url' or 'urls' parameter".to_string(),
                    ));
                }
                urls.truncate(MAX_FETCH_URLS);
                Ok(RequestedAction::Fetch { urls })
            }
        }
    }
}
