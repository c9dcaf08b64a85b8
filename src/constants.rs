// src/constants.rs

/// Extension appended to external command names that lack one.
pub const SCRIPT_EXTENSION: &str = ".js";

/// Flag that makes a re-executed child rebuild its context from a transport file.
pub const RESUME_FLAG: &str = "-S";

/// Flag naming the inherited descriptor that carries the transport key.
pub const KEY_FD_FLAG: &str = "-K";

/// Descriptor number the transport key is handed over on.
pub const KEY_FD: i32 = 3;

/// Name shown as `argv[0]` to scripts.
pub const PROGRAM_NAME: &str = "jsh";

/// Mount point of the user's working directory.
pub const WORK_MOUNT_POINT: &str = "/work";

/// The root mount point. Exactly one entry must own it before execution.
pub const ROOT_MOUNT_POINT: &str = "/";

/// Default search path for external commands (virtual directories).
pub const DEFAULT_PATH: &str = "/sbin:/work";

/// Default module search path exposed to scripts.
pub const DEFAULT_LIBRARY_PATH: &str = "./node_modules:/lib";

/// Maximum number of history entries kept.
pub const HISTORY_CAPACITY: usize = 100;

/// The name of the history file (inside the jsh config directory).
pub const HISTORY_FILENAME: &str = "history.jsonl";

/// The name of the application directory under the system config/cache dirs.
pub const APP_DIR_NAME: &str = "jsh";

/// The name of the directory holding pending transport files.
pub const TRANSPORT_DIR_NAME: &str = "transport";

// --- Exit codes ---

/// A result that carried no integral exit code.
pub const EXIT_UNKNOWN: i32 = -1;
/// Generic failure, including context construction and transport failures.
pub const EXIT_FAILURE: i32 = 1;
/// The line could not be parsed.
pub const EXIT_USAGE: i32 = 2;
/// Command or script not found.
pub const EXIT_NOT_FOUND: i32 = 127;
/// The pipeline was interrupted from the terminal.
pub const EXIT_INTERRUPTED: i32 = 130;
