// Stamps the build time and target triple reported by `ricache info`.
fn main() {
    use vergen::{BuildBuilder, CargoBuilder, Emitter};

    let mut emitter = Emitter::default();

    match BuildBuilder::default().build_timestamp(true).build() {
        Ok(build) => {
            let _ = emitter.add_instructions(&build);
        }
        Err(e) => println!("cargo:warning=build timestamp unavailable: {e}"),
    }
    match CargoBuilder::default().target_triple(true).build() {
        Ok(cargo) => {
            let _ = emitter.add_instructions(&cargo);
        }
        Err(e) => println!("cargo:warning=target triple unavailable: {e}"),
    }

    if let Err(e) = emitter.emit() {
        eprintln!("vergen emit skipped: {e}");
    }
}
