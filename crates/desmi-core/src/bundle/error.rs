// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Defines the error hierarchy for the bundle loading pipeline.

use std::error::Error;
use std::fmt;

/// An error produced while resolving or loading bundle archives.
///
/// Configuration errors (unknown packages, unindexed assets) and lane
/// failures (fetch, decrypt, assemble) travel through this one taxonomy.
/// Expected failure modes never cross the facade as errors: they are logged
/// there and collapse into sentinel values for the caller.
#[derive(Debug)]
pub enum BundleError {
    /// `initialize` was called for a package name that is already registered.
    PackageAlreadyInitialized {
        /// The offending package name.
        package: String,
    },
    /// The named package has never been initialized.
    UnknownPackage {
        /// The requested package name.
        package: String,
    },
    /// The asset path appears in none of the package's manifest tables.
    AssetNotIndexed {
        /// The owning package name.
        package: String,
        /// The requested asset path.
        path: String,
    },
    /// An in-flight load completed without producing an archive object.
    ArchiveUnavailable {
        /// The archive name whose load failed.
        archive: String,
    },
    /// The byte provider failed to deliver the archive's bytes.
    Fetch {
        /// The archive name being fetched.
        archive: String,
        /// The underlying lane error.
        source: Box<dyn Error + Send + Sync>,
    },
    /// Decryption of the fetched bytes failed.
    Cipher {
        /// The archive name being decrypted.
        archive: String,
        /// The underlying lane error.
        source: Box<dyn Error + Send + Sync>,
    },
    /// The fetched bytes could not be assembled into an archive object.
    Assembly {
        /// The archive name being assembled.
        archive: String,
        /// The underlying lane error.
        source: Box<dyn Error + Send + Sync>,
    },
}

impl fmt::Display for BundleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BundleError::PackageAlreadyInitialized { package } => {
                write!(f, "package '{package}' is already initialized")
            }
            BundleError::UnknownPackage { package } => {
                write!(f, "package '{package}' is not initialized")
            }
            BundleError::AssetNotIndexed { package, path } => {
                write!(
                    f,
                    "asset '{path}' is not indexed by any table of package '{package}'"
                )
            }
            BundleError::ArchiveUnavailable { archive } => {
                write!(f, "archive '{archive}' finished loading without an archive object")
            }
            BundleError::Fetch { archive, source } => {
                write!(f, "failed to fetch bytes for archive '{archive}': {source}")
            }
            BundleError::Cipher { archive, source } => {
                write!(f, "failed to decrypt bytes for archive '{archive}': {source}")
            }
            BundleError::Assembly { archive, source } => {
                write!(f, "failed to assemble archive '{archive}': {source}")
            }
        }
    }
}

impl Error for BundleError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            BundleError::Fetch { source, .. }
            | BundleError::Cipher { source, .. }
            | BundleError::Assembly { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}
