//! Compiled contract artifacts: loading, library linking and ABI encoding.
//!
//! Both Hardhat (`bytecode` is a hex string next to `linkReferences`) and
//! Foundry (`bytecode` is an object with `object` and `linkReferences`)
//! artifact layouts are accepted.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use alloy_core::{
    dyn_abi::{DynSolType, DynSolValue, JsonAbiExt, Specifier},
    json_abi::{JsonAbi, Param},
    primitives::{Address, Bytes},
};
use anyhow::{Context, Result};
use serde::Deserialize;

use crate::ArgValue;

/// Position of a library placeholder in creation bytecode, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct LinkOffset {
    pub start: usize,
    pub length: usize,
}

/// Source file to library name to placeholder offsets.
pub type LinkReferences = BTreeMap<String, BTreeMap<String, Vec<LinkOffset>>>;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawBytecode {
    Hex(String),
    Object {
        object: String,
        #[serde(default, rename = "linkReferences")]
        link_references: LinkReferences,
    },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawArtifact {
    #[serde(default)]
    contract_name: Option<String>,
    #[serde(default)]
    source_name: Option<String>,
    abi: serde_json::Value,
    bytecode: RawBytecode,
    #[serde(default)]
    link_references: LinkReferences,
}

/// A compiled contract.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub contract_name: String,
    /// Solidity source path, when the artifact records it.
    pub source_name: Option<String>,
    pub abi: JsonAbi,
    /// The ABI exactly as found in the artifact, stored in lock entries.
    pub raw_abi: serde_json::Value,
    /// Creation bytecode, hex without `0x`, placeholders unlinked.
    bytecode: String,
    pub link_references: LinkReferences,
}

impl Artifact {
    /// Parse an artifact from its JSON text.
    pub fn from_json(contract_name: &str, content: &str) -> Result<Self> {
        let raw: RawArtifact =
            serde_json::from_str(content).context("Failed to parse artifact JSON")?;

        let (bytecode, link_references) = match raw.bytecode {
            RawBytecode::Hex(hex) => (hex, raw.link_references),
            RawBytecode::Object {
                object,
                link_references,
            } => (object, link_references),
        };

        let abi: JsonAbi =
            serde_json::from_value(raw.abi.clone()).context("Failed to parse artifact ABI")?;

        Ok(Self {
            contract_name: raw.contract_name.unwrap_or_else(|| contract_name.to_string()),
            source_name: raw.source_name,
            abi,
            raw_abi: raw.abi,
            bytecode: bytecode.trim_start_matches("0x").to_string(),
            link_references,
        })
    }

    /// Library names the bytecode expects, as `(source, name)` pairs.
    pub fn required_libraries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.link_references.iter().flat_map(|(source, libs)| {
            libs.keys().map(move |name| (source.as_str(), name.as_str()))
        })
    }

    /// Whether `placeholder` names a library of this artifact, either as
    /// `Name` or `path/Source.sol:Name`.
    pub fn has_library(&self, placeholder: &str) -> bool {
        self.required_libraries()
            .any(|(source, name)| library_matches(placeholder, source, name))
    }

    /// Creation bytecode with every placeholder replaced by the address given
    /// in `libraries`.
    pub fn link(&self, libraries: &BTreeMap<String, Address>) -> Result<Bytes> {
        for placeholder in libraries.keys() {
            if !self.has_library(placeholder) {
                anyhow::bail!(
                    "library `{placeholder}` is not linked by contract `{}`",
                    self.contract_name
                );
            }
        }

        let mut code = self.bytecode.clone();
        for (source, libs) in &self.link_references {
            for (name, offsets) in libs {
                let address = libraries
                    .iter()
                    .find(|(placeholder, _)| library_matches(placeholder, source, name))
                    .map(|(_, address)| address)
                    .with_context(|| {
                        format!(
                            "no address provided for library `{name}` ({source}) of `{}`",
                            self.contract_name
                        )
                    })?;
                let address_hex = hex::encode(address.as_slice());

                for offset in offsets {
                    let start = offset.start * 2;
                    let end = (offset.start + offset.length) * 2;
                    if end > code.len() || offset.length != 20 {
                        anyhow::bail!(
                            "invalid link reference for `{name}` in `{}`",
                            self.contract_name
                        );
                    }
                    code.replace_range(start..end, &address_hex);
                }
            }
        }

        let bytes = hex::decode(&code).with_context(|| {
            format!(
                "bytecode of `{}` is not valid hex; is a library left unlinked?",
                self.contract_name
            )
        })?;
        Ok(Bytes::from(bytes))
    }

    /// ABI-encode constructor arguments (without selector).
    pub fn encode_constructor(&self, args: &[ArgValue]) -> Result<Vec<u8>> {
        let Some(constructor) = self.abi.constructor() else {
            if !args.is_empty() {
                anyhow::bail!(
                    "`{}` has no constructor but {} argument(s) were given",
                    self.contract_name,
                    args.len()
                );
            }
            return Ok(Vec::new());
        };

        let values = coerce_params(&constructor.inputs, args)
            .with_context(|| format!("invalid constructor arguments for `{}`", self.contract_name))?;
        constructor
            .abi_encode_input(&values)
            .context("Failed to ABI-encode constructor arguments")
    }
}

/// Calldata for `function(args)` against `abi`, picking the overload whose
/// parameters accept `args`.
pub fn encode_call(abi: &JsonAbi, function: &str, args: &[ArgValue]) -> Result<Bytes> {
    let overloads = abi
        .function(function)
        .with_context(|| format!("function `{function}` not found in ABI"))?;

    let mut last_error = None;
    for candidate in overloads.iter().filter(|f| f.inputs.len() == args.len()) {
        match coerce_params(&candidate.inputs, args) {
            Ok(values) => {
                let data = candidate
                    .abi_encode_input(&values)
                    .with_context(|| format!("Failed to encode call to `{function}`"))?;
                return Ok(Bytes::from(data));
            }
            Err(err) => last_error = Some(err),
        }
    }

    Err(last_error.unwrap_or_else(|| {
        anyhow::anyhow!("no overload of `{function}` takes {} argument(s)", args.len())
    }))
}

fn library_matches(placeholder: &str, source: &str, name: &str) -> bool {
    match placeholder.rsplit_once(':') {
        Some((path, lib)) => lib == name && path == source,
        None => placeholder == name,
    }
}

fn coerce_params(params: &[Param], args: &[ArgValue]) -> Result<Vec<DynSolValue>> {
    if params.len() != args.len() {
        anyhow::bail!("expected {} argument(s), got {}", params.len(), args.len());
    }

    params
        .iter()
        .zip(args)
        .map(|(param, value)| {
            let ty = param
                .resolve()
                .with_context(|| format!("unsupported parameter type `{}`", param.ty))?;
            coerce(&ty, value).with_context(|| format!("parameter `{}`", param.name))
        })
        .collect()
}

/// Convert `value` to a value of Solidity type `ty`.
pub fn coerce(ty: &DynSolType, value: &ArgValue) -> Result<DynSolValue> {
    let coerced = match (ty, value) {
        (DynSolType::Address, ArgValue::Address(address)) => DynSolValue::Address(*address),
        (DynSolType::Uint(bits), ArgValue::Uint(number)) => DynSolValue::Uint(*number, *bits),
        (DynSolType::Bool, ArgValue::Bool(flag)) => DynSolValue::Bool(*flag),
        (DynSolType::Bytes, ArgValue::Bytes(bytes)) => DynSolValue::Bytes(bytes.to_vec()),
        (DynSolType::Array(inner), ArgValue::List(items)) => DynSolValue::Array(
            items
                .iter()
                .map(|item| coerce(inner, item))
                .collect::<Result<_>>()?,
        ),
        (DynSolType::FixedArray(inner, len), ArgValue::List(items)) if items.len() == *len => {
            DynSolValue::FixedArray(
                items
                    .iter()
                    .map(|item| coerce(inner, item))
                    .collect::<Result<_>>()?,
            )
        }
        (DynSolType::Tuple(types), ArgValue::List(items)) if items.len() == types.len() => {
            DynSolValue::Tuple(
                types
                    .iter()
                    .zip(items)
                    .map(|(ty, item)| coerce(ty, item))
                    .collect::<Result<_>>()?,
            )
        }
        (_, ArgValue::List(_)) => anyhow::bail!("a list cannot be passed as `{ty}`"),
        (_, scalar) => ty
            .coerce_str(&scalar_to_string(scalar))
            .with_context(|| format!("cannot convert {scalar:?} to `{ty}`"))?,
    };
    Ok(coerced)
}

fn scalar_to_string(value: &ArgValue) -> String {
    match value {
        ArgValue::Bool(flag) => flag.to_string(),
        ArgValue::Int(number) => number.to_string(),
        ArgValue::Text(text) => text.clone(),
        ArgValue::Address(address) => address.to_string(),
        ArgValue::Uint(number) => number.to_string(),
        ArgValue::Bytes(bytes) => format!("0x{}", hex::encode(bytes)),
        ArgValue::List(_) => String::new(),
    }
}

/// Locates artifacts under a directory tree (`out/` or `artifacts/`).
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Load the artifact of `contract`, given as `Name` or
    /// `path/Source.sol:Name`.
    pub fn load(&self, contract: &str) -> Result<Artifact> {
        let path = self.find(contract)?;
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read artifact {}", path.display()))?;
        let name = contract.rsplit_once(':').map_or(contract, |(_, name)| name);
        Artifact::from_json(name, &content)
            .with_context(|| format!("Invalid artifact {}", path.display()))
    }

    fn find(&self, contract: &str) -> Result<PathBuf> {
        let (source, name) = match contract.rsplit_once(':') {
            Some((source, name)) => (Some(source), name),
            None => (None, contract),
        };
        let file_name = format!("{name}.json");

        let mut matches = Vec::new();
        collect_files(&self.root, &file_name, &mut matches)
            .with_context(|| format!("Failed to scan artifacts in {}", self.root.display()))?;

        if let Some(source) = source {
            let source_file = Path::new(source).file_name().unwrap_or_default();
            matches.retain(|path| {
                path.parent()
                    .and_then(Path::file_name)
                    .is_some_and(|dir| dir == source_file)
            });
        }

        match matches.len() {
            0 => anyhow::bail!(
                "artifact for `{contract}` not found under {}",
                self.root.display()
            ),
            1 => Ok(matches.remove(0)),
            _ => anyhow::bail!(
                "artifact name `{contract}` is ambiguous ({} matches); use `path/Source.sol:{name}`",
                matches.len()
            ),
        }
    }
}

fn collect_files(dir: &Path, file_name: &str, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            if path.file_name().is_some_and(|name| name == "build-info") {
                continue;
            }
            collect_files(&path, file_name, out)?;
        } else if path.file_name().is_some_and(|name| name == file_name) {
            out.push(path);
        }
    }
    Ok(())
}
