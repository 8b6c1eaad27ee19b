//! Privilege drop for tool-run subprocesses (§4.3 step 3).
//!
//! Both the async worker and the synchronous `/tooler/run` path exec
//! through here before `spawn()` so a configured `privilege_drop_user`
//! applies uniformly regardless of which path launched the command.

use tr_domain::config::SupervisorConfig;

#[cfg(unix)]
fn resolve_user(name: &str) -> Option<(u32, u32)> {
    let cname = std::ffi::CString::new(name).ok()?;
    // SAFETY: getpwnam's result points into a static buffer owned by libc;
    // the uid/gid fields are copied out before any other getpw* call can
    // invalidate it.
    let pw = unsafe { libc::getpwnam(cname.as_ptr()) };
    if pw.is_null() {
        return None;
    }
    let pw = unsafe { &*pw };
    Some((pw.pw_uid, pw.pw_gid))
}

#[cfg(not(unix))]
fn resolve_user(_name: &str) -> Option<(u32, u32)> {
    None
}

/// Apply `cfg.privilege_drop_user` to a not-yet-spawned command, if set.
/// Returns an error string (never panics, never spawns) when the user
/// can't be resolved, so the caller can surface it the same way it
/// surfaces any other startup precondition failure.
#[cfg(unix)]
pub fn apply(cmd: &mut tokio::process::Command, cfg: &SupervisorConfig) -> Result<(), String> {
    let Some(user) = &cfg.privilege_drop_user else {
        return Ok(());
    };
    let Some((uid, gid)) = resolve_user(user) else {
        return Err(format!("privilege_drop_user '{user}' does not exist"));
    };
    cmd.gid(gid);
    cmd.uid(uid);
    Ok(())
}

#[cfg(not(unix))]
pub fn apply(_cmd: &mut tokio::process::Command, cfg: &SupervisorConfig) -> Result<(), String> {
    if cfg.privilege_drop_user.is_some() {
        return Err("privilege_drop_user is not supported on this platform".into());
    }
    Ok(())
}
