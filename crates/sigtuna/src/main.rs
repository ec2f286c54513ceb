#![forbid(unsafe_code)]

//! Sigtuna CLI — verify XAdES container signatures (offline, TM offline)
//! and acquire TM time-marks online.

use clap::{Parser, Subcommand};
use sigtuna_certs::{MemoryTrustStore, X509Cert};
use sigtuna_core::{algorithm, Error};
use sigtuna_ocsp::{issuer_cn, HttpTransport, OcspConf, OcspConfRegistry};
use sigtuna_tm::TmValidator;
use sigtuna_xades::{validate_offline, MemoryContainer, SignatureDocument};
use std::path::{Path, PathBuf};
use std::process;

#[derive(Parser)]
#[command(
    name = "sigtuna",
    about = "Sigtuna — XAdES signed-container verification",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify a signature offline against its container documents
    Verify {
        /// Signature XML file
        signature: PathBuf,

        /// Container document, as URI=FILE or FILE (file name is the URI)
        #[arg(short, long = "doc")]
        docs: Vec<String>,

        /// Trusted CA certificates (PEM bundle or DER)
        #[arg(long)]
        trusted: Vec<PathBuf>,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Verify a TM signature with its embedded OCSP response
    VerifyTm {
        /// Signature XML file
        signature: PathBuf,

        /// Container document, as URI=FILE or FILE (file name is the URI)
        #[arg(short, long = "doc")]
        docs: Vec<String>,

        /// Trusted CA certificates (PEM bundle or DER)
        #[arg(long)]
        trusted: Vec<PathBuf>,

        /// Acceptable OCSP responder certificate (PEM bundle or DER)
        #[arg(long = "ocsp-cert")]
        ocsp_certs: Vec<PathBuf>,

        /// Allowed clock skew in seconds
        #[arg(long, default_value_t = 300)]
        skew: u64,

        /// Maximum OCSP response age in seconds
        #[arg(long, default_value_t = 3600)]
        max_age: u64,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Obtain a fresh OCSP time-mark and emit the augmented signature
    Extend {
        /// Signature XML file (BES)
        signature: PathBuf,

        /// Trusted CA certificates (PEM bundle or DER)
        #[arg(long)]
        trusted: Vec<PathBuf>,

        /// Acceptable OCSP responder certificate (PEM bundle or DER)
        #[arg(long = "ocsp-cert")]
        ocsp_certs: Vec<PathBuf>,

        /// OCSP responder URL
        #[arg(long)]
        url: String,

        /// Allowed clock skew in seconds
        #[arg(long, default_value_t = 300)]
        skew: u64,

        /// Maximum OCSP response age in seconds
        #[arg(long, default_value_t = 3600)]
        max_age: u64,

        /// Digest method URI for the nonce and reference hashes
        #[arg(long, default_value = algorithm::SHA256)]
        digest: String,

        /// OCSP exchange deadline in seconds
        #[arg(long, default_value_t = 30)]
        timeout: u64,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli.command) {
        eprintln!("sigtuna: {e}");
        process::exit(1);
    }
}

fn run(command: Commands) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Verify {
            signature,
            docs,
            trusted,
            verbose,
        } => {
            let doc = parse_signature(&signature)?;
            let mut container = load_container(&docs)?;
            let store = load_store(&trusted)?;

            validate_offline(&doc, &mut container, &store)?;
            if verbose {
                eprintln!("profile: {:?}", doc.profile());
            }
            println!("OK: signature is valid; signed by {}", doc.subject()?);
            Ok(())
        }

        Commands::VerifyTm {
            signature,
            docs,
            trusted,
            ocsp_certs,
            skew,
            max_age,
            verbose,
        } => {
            let doc = parse_signature(&signature)?;
            let mut container = load_container(&docs)?;
            let store = load_store(&trusted)?;
            let registry = build_registry(&doc, &ocsp_certs, String::new(), skew, max_age)?;

            validate_offline(&doc, &mut container, &store)?;
            let validator = TmValidator::new(&doc, &registry, &store, algorithm::SHA256);
            validator.validate_tm_offline()?;
            if verbose {
                eprintln!("producedAt: {}", validator.produced_at()?);
            }
            println!("OK: TM signature is valid; signed by {}", doc.subject()?);
            Ok(())
        }

        Commands::Extend {
            signature,
            trusted,
            ocsp_certs,
            url,
            skew,
            max_age,
            digest,
            timeout,
            output,
            verbose,
        } => {
            let doc = parse_signature(&signature)?;
            let store = load_store(&trusted)?;
            let registry = build_registry(&doc, &ocsp_certs, url, skew, max_age)?;
            let transport = HttpTransport::new(std::time::Duration::from_secs(timeout))?;

            let validator = TmValidator::new(&doc, &registry, &store, &digest);
            let augmented = validator.acquire_tm_online(&transport)?;
            if verbose {
                eprintln!("augmented signature is {} bytes", augmented.len());
            }
            match output {
                Some(path) => std::fs::write(path, augmented)?,
                None => print!("{augmented}"),
            }
            Ok(())
        }
    }
}

fn parse_signature(path: &Path) -> Result<SignatureDocument, Error> {
    let data = std::fs::read(path)?;
    SignatureDocument::parse(&data)
}

/// `URI=FILE` selects the URI explicitly; a bare path uses its file name.
fn load_container(docs: &[String]) -> Result<MemoryContainer, Error> {
    let mut container = MemoryContainer::new();
    for spec in docs {
        let (uri, path) = match spec.split_once('=') {
            Some((uri, path)) => (uri.to_owned(), PathBuf::from(path)),
            None => {
                let path = PathBuf::from(spec);
                let uri = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .ok_or_else(|| Error::Config(format!("not a file: {spec}")))?;
                (uri, path)
            }
        };
        container.add_document(&uri, std::fs::read(path)?);
    }
    Ok(container)
}

fn load_store(paths: &[PathBuf]) -> Result<MemoryTrustStore, Error> {
    let mut store = MemoryTrustStore::new();
    for path in paths {
        let data = std::fs::read(path)?;
        if data.starts_with(b"-----") {
            store.add_pem(&data)?;
        } else {
            store.add(X509Cert::from_der(&data)?);
        }
    }
    Ok(store)
}

fn load_certs(paths: &[PathBuf]) -> Result<Vec<X509Cert>, Error> {
    Ok(load_store(paths)?.into_certs())
}

/// One responder configuration, keyed by the CN of the signer's issuer.
fn build_registry(
    doc: &SignatureDocument,
    ocsp_certs: &[PathBuf],
    url: String,
    skew: u64,
    max_age: u64,
) -> Result<OcspConfRegistry, Error> {
    let cn = issuer_cn(&doc.signing_certificate()?.issuer())?;
    let mut registry = OcspConfRegistry::new();
    registry.insert(
        &cn,
        OcspConf {
            url,
            responder_certs: load_certs(ocsp_certs)?,
            skew,
            max_age,
        },
    );
    Ok(registry)
}
