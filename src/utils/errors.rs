//! User-Friendly Error Formatting
//!
//! Turns startup and connection failures into messages with
//! troubleshooting hints for the usual suspects.

use std::fmt::Write;

/// Format error for user consumption
///
/// Takes technical error and produces user-friendly message with
/// troubleshooting steps and context.
pub fn format_user_error(error: &anyhow::Error) -> String {
    let mut output = String::new();

    // Header
    writeln!(&mut output).ok();
    writeln!(
        &mut output,
        "╔════════════════════════════════════════════════════════════╗"
    )
    .ok();
    writeln!(
        &mut output,
        "║                     ERROR                                  ║"
    )
    .ok();
    writeln!(
        &mut output,
        "╚════════════════════════════════════════════════════════════╝"
    )
    .ok();
    writeln!(&mut output).ok();

    // Analyze the whole chain; the interesting part is usually the root cause
    let error_msg = format!("{:#}", error);

    if error_msg.contains("XFIXES") {
        format_extension_error(&mut output);
    } else if error_msg.contains("connection") || error_msg.contains("display") {
        format_display_error(&mut output);
    } else if error_msg.contains("resolve") {
        format_name_error(&mut output);
    } else if error_msg.contains("config") {
        format_config_error(&mut output);
    } else {
        format_generic_error(&mut output, &error_msg);
    }

    // Technical details
    writeln!(&mut output).ok();
    writeln!(
        &mut output,
        "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━"
    )
    .ok();
    writeln!(&mut output, "Technical Details:").ok();
    writeln!(&mut output).ok();
    writeln!(&mut output, "{:#}", error).ok();
    writeln!(&mut output).ok();

    // Footer with help
    writeln!(
        &mut output,
        "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━"
    )
    .ok();
    writeln!(&mut output, "Need Help?").ok();
    writeln!(
        &mut output,
        "  - Run with --verbose for detailed logs: lamco-selection-sync -vv"
    )
    .ok();
    writeln!(
        &mut output,
        "  - Keep a log with: lamco-selection-sync --log-file sync.log"
    )
    .ok();
    writeln!(
        &mut output,
        "╚════════════════════════════════════════════════════════════╝"
    )
    .ok();

    output
}

fn format_display_error(output: &mut String) {
    writeln!(output, "Display Connection Error").ok();
    writeln!(output).ok();
    writeln!(output, "Could not talk to the X display.").ok();
    writeln!(output).ok();
    writeln!(output, "Common Causes:").ok();
    writeln!(output).ok();
    writeln!(output, "  1. DISPLAY is not set").ok();
    writeln!(output, "     → Check: echo $DISPLAY").ok();
    writeln!(output, "     → Or pass it explicitly: --display :0").ok();
    writeln!(output).ok();
    writeln!(output, "  2. Not authorized to connect").ok();
    writeln!(output, "     → Check: xauth list").ok();
    writeln!(output, "     → XAUTHORITY must point at the session's cookie file").ok();
    writeln!(output).ok();
    writeln!(output, "  3. The X server went away").ok();
    writeln!(output, "     → The session ended or Xwayland was restarted").ok();
    writeln!(output, "     → Restart the daemon with the new session").ok();
}

fn format_extension_error(output: &mut String) {
    writeln!(output, "Missing X Extension").ok();
    writeln!(output).ok();
    writeln!(
        output,
        "The X server does not support XFIXES, which is needed to learn about selection changes."
    )
    .ok();
    writeln!(output).ok();
    writeln!(output, "Common Causes:").ok();
    writeln!(output).ok();
    writeln!(output, "  1. Very old or minimal X server").ok();
    writeln!(output, "     → Check: xdpyinfo | grep XFIXES").ok();
    writeln!(output, "     → Any Xorg or Xwayland from the last decade has it").ok();
    writeln!(output).ok();
    writeln!(output, "  2. Nested or virtual server started without it").ok();
    writeln!(output, "     → Xvfb/Xephyr: make sure extensions are not disabled").ok();
}

fn format_name_error(output: &mut String) {
    writeln!(output, "Selection Name Error").ok();
    writeln!(output).ok();
    writeln!(output, "A configured selection name could not be resolved.").ok();
    writeln!(output).ok();
    writeln!(output, "Common Causes:").ok();
    writeln!(output).ok();
    writeln!(output, "  1. Typo in [selections]").ok();
    writeln!(output, "     → Names are case sensitive: PRIMARY, CLIPBOARD, SECONDARY").ok();
    writeln!(output).ok();
    writeln!(output, "  2. X server refused to create the name").ok();
    writeln!(output, "     → Retry; this usually means the server is out of resources").ok();
}

fn format_config_error(output: &mut String) {
    writeln!(output, "Configuration Error").ok();
    writeln!(output).ok();
    writeln!(output, "Problem with configuration file.").ok();
    writeln!(output).ok();
    writeln!(output, "Common Causes:").ok();
    writeln!(output).ok();
    writeln!(output, "  1. Invalid TOML syntax").ok();
    writeln!(output, "     → Check for typos, missing quotes, etc.").ok();
    writeln!(output).ok();
    writeln!(output, "  2. Invalid values").ok();
    writeln!(output, "     → mode must be bidirectional, a-to-b or b-to-a").ok();
    writeln!(output, "     → selections a and b must name different selections").ok();
    writeln!(output, "     → chunk_size must be at least 4 bytes").ok();
    writeln!(output).ok();
    writeln!(output, "  3. Wrong file").ok();
    writeln!(
        output,
        "     → Default location: ~/.config/lamco-selection-sync/config.toml"
    )
    .ok();
    writeln!(
        output,
        "     → Or specify: lamco-selection-sync -c /path/to/config.toml"
    )
    .ok();
}

fn format_generic_error(output: &mut String, error: &str) {
    writeln!(output, "Selection Sync Error").ok();
    writeln!(output).ok();
    writeln!(output, "An error occurred while running the daemon.").ok();
    writeln!(output).ok();
    writeln!(output, "Error: {}", error).ok();
    writeln!(output).ok();
    writeln!(output, "Troubleshooting:").ok();
    writeln!(output).ok();
    writeln!(output, "  1. Check the X session is still alive:").ok();
    writeln!(output, "     → xprop -root _NET_SUPPORTING_WM_CHECK").ok();
    writeln!(output).ok();
    writeln!(output, "  2. Run again with -vv and look at the last log lines").ok();
}
