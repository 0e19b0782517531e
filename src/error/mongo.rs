use std::fmt;

/// Structured error information extracted from MongoDB driver errors.
///
/// Only the read-side kinds an export can run into are distinguished;
/// everything else falls back to the driver's own message.
#[derive(Debug, Default, Clone)]
pub struct ErrorInfo {
    pub(crate) code: Option<i32>,
    pub(crate) name: Option<String>,
    pub(crate) message: Option<String>,
}

impl ErrorInfo {
    /// One-line rendering used in diagnostics and stage error reasons.
    ///
    /// Example: `Unauthorized (13): not authorized on shop to execute command`
    pub fn summary(&self) -> String {
        let message = self.message.as_deref().unwrap_or("unknown error");
        match (&self.name, self.code) {
            (Some(name), Some(code)) => format!("{name} ({code}): {message}"),
            (None, Some(code)) => format!("code {code}: {message}"),
            _ => message.to_string(),
        }
    }
}

/// Display hook for `ExportError::Driver`.
pub fn format_mongodb_error(
    f: &mut fmt::Formatter<'_>,
    error: &mongodb::error::Error,
) -> fmt::Result {
    let info = extract_error_info(error);
    write!(f, "MongoDB error: {}", info.summary())
}

/// Human-readable reason for a driver error, for wrapping into stage errors.
pub fn describe(error: &mongodb::error::Error) -> String {
    extract_error_info(error).summary()
}

/// Extract structured information from a MongoDB error using the driver API.
///
/// Typed error kinds are used directly instead of parsing messages.
pub fn extract_error_info(error: &mongodb::error::Error) -> ErrorInfo {
    use mongodb::error::ErrorKind;

    let mut info = ErrorInfo::default();

    match error.kind.as_ref() {
        ErrorKind::Command(command_error) => {
            info.code = Some(command_error.code);
            info.message = Some(command_error.message.clone());
            info.name = get_error_name(command_error.code)
                .or_else(|| Some(command_error.code_name.clone()).filter(|n| !n.is_empty()));
        }
        ErrorKind::Authentication { message, .. } => {
            info.name = Some("AuthenticationFailed".to_string());
            info.message = Some(message.clone());
        }
        ErrorKind::InvalidArgument { message, .. } => {
            info.message = Some(message.clone());
        }
        ErrorKind::ServerSelection { message, .. } => {
            info.name = Some("ServerSelectionTimeout".to_string());
            info.message = Some(message.clone());
        }
        ErrorKind::Io(io_error) => {
            info.message = Some(io_error.to_string());
        }
        _ => {
            info.message = Some(error.to_string());
        }
    }

    info
}

/// Whether retrying the same operation might succeed.
pub fn is_transient(error: &mongodb::error::Error) -> bool {
    use mongodb::error::ErrorKind;

    match error.kind.as_ref() {
        ErrorKind::Io(_) | ErrorKind::ServerSelection { .. } => true,
        ErrorKind::Command(command_error) => matches!(command_error.code, 6 | 7 | 89 | 91 | 189),
        _ => false,
    }
}

/// Get a human-readable error name from a MongoDB error code.
fn get_error_name(code: i32) -> Option<String> {
    let name = match code {
        13 => "Unauthorized",
        18 => "AuthenticationFailed",
        26 => "NamespaceNotFound",
        43 => "CursorNotFound",
        50 => "MaxTimeMSExpired",
        11601 => "Interrupted",
        _ => return None,
    };

    Some(name.to_string())
}
