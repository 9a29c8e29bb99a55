fn main() {
    if let Err(err) = structured_writer::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
