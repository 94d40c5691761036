fn main() {
    let mut args = std::env::args().skip(1);
    if let Some(command) = args.next() {
        if command == "notify" {
            let Some(body) = args.next() else {
                eprintln!("Usage: codecatcher notify <body> [title]");
                std::process::exit(2);
            };
            let title = args.next();
            if let Err(err) = codecatcher_lib::send_notification(title.as_deref(), &body) {
                eprintln!("codecatcher: {err:#}");
                std::process::exit(1);
            }
            return;
        }
        eprintln!("Usage: codecatcher [notify <body> [title]]");
        std::process::exit(2);
    }

    if let Err(err) = codecatcher_lib::run() {
        eprintln!("codecatcher: {err:#}");
        std::process::exit(1);
    }
}
