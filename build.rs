use std::io::Result;

fn main() -> Result<()> {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=protos");

    // Vendored protoc keeps the build independent of a system installation
    let protoc_path = protoc_bin_vendored::protoc_bin_path()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::NotFound, e.to_string()))?;
    std::env::set_var("PROTOC", protoc_path);
    let well_known = protoc_bin_vendored::include_path()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::NotFound, e.to_string()))?;

    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_protos(
            &[
                "protos/containerd/events/events.proto",
                "protos/containerd/events/container.proto",
                "protos/containerd/events/image.proto",
                "protos/containerd/events/task.proto",
            ],
            &[std::path::PathBuf::from("protos"), well_known],
        )?;
    Ok(())
}
