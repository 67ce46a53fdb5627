fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Use the vendored protoc so builds do not depend on a system install.
    std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path()?);

    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_protos(
            &[
                "proto/stigmer/v1/meta.proto",
                "proto/stigmer/v1/agent.proto",
                "proto/stigmer/v1/workflow.proto",
                "proto/stigmer/v1/resources.proto",
                "proto/stigmer/v1/services.proto",
            ],
            &["proto"],
        )?;

    println!("cargo:rerun-if-changed=proto");
    Ok(())
}
