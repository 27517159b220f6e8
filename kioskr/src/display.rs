use config::{KioskSettings, Rotation};
use log::{info, warn};
use std::process::{Command, Stdio};

const TOUCH_MATRIX_PROPERTY: &str = "Coordinate Transformation Matrix";

/// Rotate the screen, keep it awake and hide the cursor. Every step is best effort.
pub(crate) fn prepare_display(settings: &KioskSettings, display: &str) {
    if let Some(output) = &settings.output {
        run_best_effort("xrandr", &xrandr_args(output, settings.rotation), display);
    }

    if let Some(device) = &settings.touch_device {
        run_best_effort("xinput", &touch_args(device, settings.rotation), display);
    }

    for args in [&["s", "off"][..], &["-dpms"][..], &["s", "noblank"][..]] {
        run_best_effort("xset", args, display);
    }

    if settings.hide_cursor {
        hide_cursor(display);
    }
}

pub(crate) fn xrandr_args(output: &str, rotation: Rotation) -> Vec<&str> {
    vec!["--output", output, "--rotate", rotation.xrandr_name()]
}

/// Touch input has to be rotated with the screen, or taps land in the wrong place
pub(crate) fn touch_matrix(rotation: Rotation) -> [&'static str; 9] {
    match rotation {
        Rotation::Normal => ["1", "0", "0", "0", "1", "0", "0", "0", "1"],
        Rotation::Left => ["0", "-1", "1", "1", "0", "0", "0", "0", "1"],
        Rotation::Right => ["0", "1", "0", "-1", "0", "1", "0", "0", "1"],
        Rotation::Inverted => ["-1", "0", "1", "0", "-1", "1", "0", "0", "1"],
    }
}

pub(crate) fn touch_args(device: &str, rotation: Rotation) -> Vec<&str> {
    let mut args = vec!["set-prop", device, TOUCH_MATRIX_PROPERTY];
    args.extend(touch_matrix(rotation));
    args
}

fn hide_cursor(display: &str) {
    match Command::new("unclutter")
        .args(["-idle", "0.5", "-root"])
        .env("DISPLAY", display)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
    {
        Ok(child) => info!("Cursor hidden by unclutter (pid {})", child.id()),
        Err(e) => warn!("Could not start unclutter, the cursor stays visible: {e}"),
    }
}

pub(crate) fn run_best_effort(program: &str, args: &[&str], display: &str) -> bool {
    let command = format!("{program} {}", args.join(" "));

    match Command::new(program)
        .args(args)
        .env("DISPLAY", display)
        .output()
    {
        Ok(output) if output.status.success() => {
            info!("Ran '{command}'");
            true
        }
        Ok(output) => {
            warn!(
                "'{command}' failed ({}): {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
            false
        }
        Err(e) => {
            warn!("Could not execute '{command}': {e}");
            false
        }
    }
}
