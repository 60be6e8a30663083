//! facelink-monitor
//!
//! Drives every capture device listed in a settings file: keeps looking
//! for them, tracks their liveness, and prints their connection events.
//! Commands typed on stdin are forwarded to the devices.

use crossbeam::channel;
use facelink::osc::{Datagram, Listener};
use facelink::{DeviceEvent, Link, Settings};
use facelink_tools::{facelink_opts, facelink_parseopts, parse_line, Action, COMMAND_HELP};
use std::env;
use std::io::{self, BufRead};
use std::net::SocketAddr;
use std::path::Path;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

macro_rules! log{
    ($tf:expr, $msg:expr)=>{
    {
        println!("{}{}", chrono::Local::now().format(&$tf), $msg);
    }
    };
    ($tf:expr, $f:expr,$($a:tt)*)=>{
    {
        log!($tf, format!($f, $($a)*));
    }
    };
}

enum Ready {
    Datagram(Option<Datagram>),
    Line(Option<String>),
    Event(usize, Option<DeviceEvent>),
}

fn stdin_thread(lines: channel::Sender<String>) -> io::Result<()> {
    std::thread::Builder::new()
        .name("stdin".to_string())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                match line {
                    Ok(line) => {
                        if lines.send(line).is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
        })?;
    Ok(())
}

fn route_datagram(links: &[Link], datagram: Datagram) {
    let (from, res) = datagram;
    let msg = match res {
        Ok(msg) => msg,
        Err(err) => {
            debug!(%from, error = %err, "malformed datagram");
            return;
        }
    };
    match links.iter().find(|l| l.address() == from.ip()) {
        Some(link) => {
            // A link that is gone has been deleted; nothing left to tell it.
            let _ = link.report_datagram(&msg);
        }
        None => debug!(%from, "datagram from unknown device: {}", msg),
    }
}

fn main() -> ExitCode {
    let mut opts = facelink_opts();
    opts.optflag("q", "", "Do not look for the devices on startup");

    let args: Vec<String> = env::args().collect();

    macro_rules! die{
        ($f:expr,$($a:tt)*)=>{
        {
            die!(format!($f, $($a)*));
        }
        };
        ($msg:expr)=>{
        {
            eprintln!("ERROR: {}", $msg);
            return ExitCode::FAILURE;
        }
        };
    }

    let (matches, config) = match facelink_parseopts(&opts, &args) {
        Ok(parsed) => parsed,
        Err(err) => die!("{}\n{}", err, opts.short_usage(&args[0])),
    };
    if matches.opt_present("h") {
        let brief = format!("Usage: {} -c settings.yaml [options]", args[0]);
        print!("{}", opts.usage(&brief));
        println!("\nCommands:\n{}", COMMAND_HELP);
        return ExitCode::SUCCESS;
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let tf = matches
        .opt_str("t")
        .unwrap_or_else(|| "%T%.3f ".to_string());

    let config = match config {
        Some(path) => path,
        None => die!("a settings file is required (-c)"),
    };
    let settings = match Settings::load(Path::new(&config)) {
        Ok(s) => s,
        Err(err) => die!(err),
    };
    if settings.devices.is_empty() {
        die!("no devices in {}", config);
    }

    let mut links: Vec<Link> = Vec::new();
    for dev in &settings.devices {
        match Link::new(settings.clone(), &dev.name) {
            Ok(link) => links.push(link),
            Err(err) => die!("{}: {}", dev.name, err),
        }
    }
    if matches.opt_present("q") {
        for link in &links {
            let _ = link.set_look_for_device(false);
        }
    }

    let (rx_send, datagrams) = Listener::rx_channel();
    let bind = SocketAddr::from(([0, 0, 0, 0], settings.server_port));
    let _listener = match Listener::new(&bind, Listener::rx_to_channel(rx_send)) {
        Ok(l) => l,
        Err(err) => die!("cannot listen on {}: {}", bind, err),
    };

    let (lines_send, lines) = channel::unbounded::<String>();
    if let Err(err) = stdin_thread(lines_send) {
        die!("cannot read stdin: {}", err);
    }

    log!(tf, "monitoring {} device(s), replies on {}", links.len(), bind);

    // Devices keep being driven after stdin closes.
    let mut stdin_open = true;
    'mainloop: loop {
        if links.is_empty() {
            log!(tf, "all devices deleted");
            break;
        }

        // The Select borrows the links, so only pick what is ready here and
        // act on it once it is gone.
        let ready = {
            let mut sel = channel::Select::new();
            for link in &links {
                sel.recv(link.events());
            }
            let datagram_index = sel.recv(&datagrams);
            let lines_index = if stdin_open { Some(sel.recv(&lines)) } else { None };
            let oper = sel.select();
            let index = oper.index();
            if index == datagram_index {
                Ready::Datagram(oper.recv(&datagrams).ok())
            } else if Some(index) == lines_index {
                Ready::Line(oper.recv(&lines).ok())
            } else {
                Ready::Event(index, oper.recv(links[index].events()).ok())
            }
        };

        match ready {
            Ready::Datagram(Some(datagram)) => route_datagram(&links, datagram),
            Ready::Datagram(None) => die!("listener stopped"),
            Ready::Line(None) => {
                debug!("stdin closed");
                stdin_open = false;
            }
            Ready::Line(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                let names: Vec<&str> = links.iter().map(|l| l.name()).collect();
                let parsed = match parse_line(&line, &names) {
                    Ok(parsed) => parsed,
                    Err(err) => {
                        eprintln!("{}", err);
                        continue;
                    }
                };
                match parsed.action {
                    Action::Quit => break 'mainloop,
                    Action::Help => println!("{}", COMMAND_HELP),
                    Action::Link(cmd) => {
                        for link in &links {
                            if parsed.device.as_deref().map_or(true, |d| d == link.name()) {
                                let _ = link.command(cmd.clone());
                            }
                        }
                    }
                }
            }
            Ready::Event(index, Some(event)) => {
                log!(tf, "{}: {}", links[index].name(), event);
                if let DeviceEvent::PollingStopped = event {
                    links.remove(index);
                }
            }
            Ready::Event(index, None) => {
                links.remove(index);
            }
        }
    }

    ExitCode::SUCCESS
}
