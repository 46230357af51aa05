fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Ensure a `protoc` binary is available even when the system package is
    // not installed, by falling back to the vendored one.
    if std::env::var_os("PROTOC").is_none() {
        if let Ok(protoc) = protoc_bin_vendored::protoc_bin_path() {
            std::env::set_var("PROTOC", protoc);
        }
    }

    // Compile the proto definitions via `prost`, generating service stubs
    // for use with `tonic`.
    tonic_build::compile_protos("proto/foreman.proto")?;
    Ok(())
}
