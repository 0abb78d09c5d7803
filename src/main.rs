fn main() {
    if let Err(e) = studio_audio_core::run() {
        eprintln!("[startup] {e}");
        std::process::exit(1);
    }
}
