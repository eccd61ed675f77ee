fn main() {
    if let Err(err) = chroma_bridge_lib::run() {
        eprintln!("chroma-bridge: {err:#}");
        std::process::exit(1);
    }
}
