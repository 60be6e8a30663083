use facelink::link::Command;
use getopts::Options;

/// Options shared by the tools.
pub fn facelink_opts() -> Options {
    let mut opts = Options::new();
    opts.optopt("c", "", "settings file (YAML)", "path");
    opts.optopt("t", "", "Timestamp format (default '%T%.3f ')", "fmt");
    opts.optflag("h", "help", "Show help");
    opts
}

/// Parses `args` (program name first), returning the matches and the
/// settings path if one was given.
pub fn facelink_parseopts(
    opts: &Options,
    args: &[String],
) -> Result<(getopts::Matches, Option<String>), String> {
    let matches = opts.parse(&args[1..]).map_err(|f| f.to_string())?;
    let config = matches.opt_str("c");
    Ok((matches, config))
}

/// What a line typed by the user asks for.
#[derive(Debug, Clone)]
pub enum Action {
    Quit,
    Help,
    Link(Command),
}

/// A parsed line: the action and, optionally, the device it is for.
#[derive(Debug, Clone)]
pub struct Line {
    pub device: Option<String>,
    pub action: Action,
}

pub const COMMAND_HELP: &str = "\
[device] connect | disconnect | launch | close | display | delete
[device] take N | slate S | record SLATE TAKE [description] | port N
[device] look on|off
quit | help";

fn parse_number<T: std::str::FromStr>(word: Option<&str>, what: &str) -> Result<T, String> {
    let word = word.ok_or_else(|| format!("missing {}", what))?;
    word.parse()
        .map_err(|_| format!("invalid {}: {}", what, word))
}

/// Parses a command line. The first word selects a device when it matches
/// one of `devices`.
pub fn parse_line(line: &str, devices: &[&str]) -> Result<Line, String> {
    let mut words = line.split_whitespace().peekable();
    let device = match words.peek() {
        Some(w) if devices.contains(w) => words.next().map(|w| w.to_string()),
        _ => None,
    };

    let verb = words.next().ok_or_else(|| "empty command".to_string())?;
    let action = match verb {
        "quit" | "exit" => Action::Quit,
        "help" => Action::Help,
        "connect" => Action::Link(Command::Connect),
        "disconnect" => Action::Link(Command::Disconnect),
        "launch" => Action::Link(Command::Launch),
        "close" => Action::Link(Command::Close),
        "display" => Action::Link(Command::ToggleDisplay),
        "delete" => Action::Link(Command::Delete),
        "take" => Action::Link(Command::SetTake(parse_number(words.next(), "take")?)),
        "port" => Action::Link(Command::SetPort(parse_number(words.next(), "port")?)),
        "slate" => {
            let slate = words.next().ok_or_else(|| "missing slate".to_string())?;
            Action::Link(Command::SetSlate(slate.to_string()))
        }
        "record" => {
            let slate = words.next().ok_or_else(|| "missing slate".to_string())?;
            let take = parse_number(words.next(), "take")?;
            let description = words.collect::<Vec<_>>().join(" ");
            return Ok(Line {
                device,
                action: Action::Link(Command::RecordStart {
                    slate: slate.to_string(),
                    take,
                    description,
                }),
            });
        }
        "look" => match words.next() {
            Some("on") => Action::Link(Command::LookForDevice(true)),
            Some("off") => Action::Link(Command::LookForDevice(false)),
            _ => return Err("expected look on|off".to_string()),
        },
        other => return Err(format!("unknown command {}", other)),
    };

    if let Some(extra) = words.next() {
        return Err(format!("unexpected argument {}", extra));
    }
    Ok(Line { device, action })
}
