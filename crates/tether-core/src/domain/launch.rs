//! Launch requests and parameters.

use serde::{Deserialize, Serialize};

use crate::codec::Bundle;

/// Raw launch input, before identity resolution.
///
/// Exactly one shape is active per launch. A bundle that carries none of
/// operation/mime/uri does not make a launch app-control; it is dropped in
/// favour of the positional form.
#[derive(Debug, Clone, PartialEq)]
pub enum LaunchRequest {
    /// `argv[0]` is the putative executable path or identity.
    Positional { argv: Vec<String> },
    AppControl { app_id: String, bundle: Bundle },
}

impl LaunchRequest {
    pub fn positional(argv: Vec<String>) -> Self {
        LaunchRequest::Positional { argv }
    }

    /// Classify an invocation (command line plus optional daemon bundle).
    pub fn from_invocation(argv: Vec<String>, bundle: Option<Bundle>) -> Self {
        match bundle {
            Some(bundle) if bundle.is_app_control() => LaunchRequest::AppControl {
                app_id: argv.into_iter().next().unwrap_or_default(),
                bundle,
            },
            _ => LaunchRequest::Positional { argv },
        }
    }

    /// Classify a launch that names the application directly.
    pub fn for_app(app_id: impl Into<String>, bundle: Option<Bundle>) -> Self {
        Self::from_invocation(vec![app_id.into()], bundle)
    }

    /// The string the identity resolver runs on.
    pub fn raw_identity(&self) -> &str {
        match self {
            LaunchRequest::Positional { argv } => argv.first().map(String::as_str).unwrap_or(""),
            LaunchRequest::AppControl { app_id, .. } => app_id,
        }
    }

    pub fn is_app_control(&self) -> bool {
        matches!(self, LaunchRequest::AppControl { .. })
    }

    /// Parameters handed to the application service.
    pub fn params(&self) -> LaunchParams {
        match self {
            LaunchRequest::Positional { argv } => LaunchParams {
                args: positional_args(argv).into_iter().skip(1).collect(),
                bundle: None,
            },
            LaunchRequest::AppControl { bundle, .. } => LaunchParams {
                args: Vec::new(),
                bundle: Some(bundle.clone()),
            },
        }
    }
}

/// What the application service receives alongside the identity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LaunchParams {
    pub args: Vec<String>,
    pub bundle: Option<Bundle>,
}

/// Positional arguments only; internal runtime flags (`--…`) are dropped.
pub fn positional_args(argv: &[String]) -> Vec<String> {
    argv.iter()
        .filter(|arg| !arg.starts_with("--"))
        .cloned()
        .collect()
}
