// src/vfs/path.rs

use crate::{
    constants::{DEFAULT_LIBRARY_PATH, DEFAULT_PATH, SCRIPT_EXTENSION},
    core::mount_table::MountTable,
};
use std::collections::BTreeMap;

/// Lexically normalizes an absolute virtual path.
///
/// Collapses duplicate separators, `.` and `..` (which never climbs above `/`)
/// and strips any trailing separator. Relative input is treated as rooted.
pub fn normalize(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for component in path.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    format!("/{}", parts.join("/"))
}

/// Resolves `path` against the virtual working directory `cwd`.
pub fn absolutize(cwd: &str, path: &str) -> String {
    if path.starts_with('/') {
        normalize(path)
    } else {
        normalize(&format!("{}/{}", cwd, path))
    }
}

/// Appends the script extension when the name does not already carry it.
pub fn normalize_script_name(name: &str) -> String {
    if name.ends_with(SCRIPT_EXTENSION) {
        name.to_string()
    } else {
        format!("{}{}", name, SCRIPT_EXTENSION)
    }
}

/// Finds the virtual path of a script, the way a shell searches `PATH`.
///
/// Names containing `/` are resolved against `PWD`; bare names are tried in
/// each `PATH` directory in order. Returns `None` if nothing matches a file.
pub fn which(mounts: &MountTable, env: &BTreeMap<String, String>, name: &str) -> Option<String> {
    let script = normalize_script_name(name);
    let cwd = env.get("PWD").map(String::as_str).unwrap_or("/");

    if script.contains('/') {
        let candidate = absolutize(cwd, &script);
        return mounts.is_file(&candidate).then_some(candidate);
    }

    let search_path = env.get("PATH").map(String::as_str).unwrap_or(DEFAULT_PATH);
    search_path
        .split(':')
        .filter(|dir| !dir.is_empty())
        .map(|dir| absolutize(cwd, &format!("{}/{}", dir, script)))
        .find(|candidate| mounts.is_file(candidate))
}

/// Finds the file `require(name)` loads.
///
/// `./x`, `../x` and `/x` are resolved against `base` (the requiring file's
/// directory); bare names are tried under each `LIBRARY_PATH` entry, whose
/// relative entries start from `PWD`. Each candidate is tried as given, with
/// the script extension, then as a directory's `index.js`.
pub fn resolve_module(
    mounts: &MountTable,
    env: &BTreeMap<String, String>,
    base: &str,
    name: &str,
) -> Option<String> {
    let find = |candidate: String| {
        [
            candidate.clone(),
            normalize_script_name(&candidate),
            format!("{}/index{}", candidate, SCRIPT_EXTENSION),
        ]
        .into_iter()
        .find(|file| mounts.is_file(file))
    };

    if name.starts_with('/') || name.starts_with("./") || name.starts_with("../") {
        return find(absolutize(base, name));
    }

    let cwd = env.get("PWD").map(String::as_str).unwrap_or("/");
    let library_path = env
        .get("LIBRARY_PATH")
        .map(String::as_str)
        .unwrap_or(DEFAULT_LIBRARY_PATH);
    library_path
        .split(':')
        .filter(|dir| !dir.is_empty())
        .find_map(|dir| find(absolutize(cwd, &format!("{}/{}", dir, name))))
}
