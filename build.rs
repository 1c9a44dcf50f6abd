//! Generates the Gitaly SSH service types from `proto/`

const JSON_MESSAGES: &[&str] = &[
    ".gitaly.Repository",
    ".gitaly.SSHUploadPackRequest",
    ".gitaly.SSHReceivePackRequest",
    ".gitaly.SSHUploadArchiveRequest",
];

const STDIN_FIELDS: &[&str] = &[
    ".gitaly.SSHUploadPackRequest.stdin",
    ".gitaly.SSHReceivePackRequest.stdin",
    ".gitaly.SSHUploadArchiveRequest.stdin",
];

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=proto");

    if std::env::var_os("PROTOC").is_none() {
        std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path()?);
    }

    // requests arrive as JSON on the handler binaries' command line
    let mut builder = tonic_build::configure().build_client(false);
    for message in JSON_MESSAGES {
        builder = builder.type_attribute(message, "#[derive(serde::Deserialize)] #[serde(default)]");
    }
    for field in STDIN_FIELDS {
        builder = builder.field_attribute(field, "#[serde(skip)]");
    }

    builder.compile(&["proto/ssh.proto"], &["proto"])?;
    Ok(())
}
