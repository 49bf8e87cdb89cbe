use anyhow::{Result, anyhow};

#[cfg(target_os = "linux")]
use std::process::{Command, Stdio};

#[cfg(not(target_os = "linux"))]
use copypasta::{ClipboardContext, ClipboardProvider};

/// Linux: wl-copy (Wayland) или xclip (X11).
#[cfg(target_os = "linux")]
pub fn copy_to_clipboard(value: &str) -> Result<()> {
    let has_wayland = std::env::var("WAYLAND_DISPLAY").is_ok();
    let has_x11 = std::env::var("DISPLAY").is_ok();

    // Ни X11, ни Wayland — скорее всего чистый tty
    if !has_wayland && !has_x11 {
        return Err(anyhow!(
            "No GUI clipboard detected (no DISPLAY or WAYLAND_DISPLAY). \
             You might be in a tty. Use:\n  otpm code <label> | xclip -selection clipboard"
        ));
    }

    let mut candidates: Vec<(&str, &[&str])> = Vec::new();
    if has_wayland {
        candidates.push(("wl-copy", &[]));
    }
    if has_x11 {
        candidates.push(("xclip", &["-selection", "clipboard"]));
    }

    for (cmd, args) in candidates {
        if pipe_to(cmd, args, value).is_ok() {
            return Ok(());
        }
    }

    Err(anyhow!(
        "Failed to copy to clipboard: wl-copy/xclip not available or failed.\n\
         Try installing `wl-clipboard` or `xclip`, or use:\n\
         otpm code <label> | xclip -selection clipboard"
    ))
}

#[cfg(target_os = "linux")]
fn pipe_to(cmd: &str, args: &[&str], value: &str) -> Result<()> {
    let mut child = Command::new(cmd)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| anyhow!("failed to spawn {}: {e}", cmd))?;

    {
        use std::io::Write;
        if let Some(stdin) = child.stdin.as_mut() {
            stdin.write_all(value.as_bytes())?;
        }
    }

    let status = child.wait()?;
    if !status.success() {
        return Err(anyhow!("{} exited with status {}", cmd, status));
    }

    Ok(())
}

/// Не-Linux (Windows/macOS и прочие): copypasta.
#[cfg(not(target_os = "linux"))]
pub fn copy_to_clipboard(value: &str) -> Result<()> {
    let mut ctx =
        ClipboardContext::new().map_err(|e| anyhow!("Failed to initialize clipboard: {e}"))?;

    ctx.set_contents(value.to_string())
        .map_err(|e| anyhow!("Failed to copy to clipboard: {e}"))?;

    Ok(())
}
