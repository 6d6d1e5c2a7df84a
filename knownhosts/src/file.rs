//! Reading and writing of known_hosts files.
//!
//! Loading is lenient: lines that can not be decoded are reported as [`SkippedLine`]s and do not
//! abort the load.
//! They are kept in the store as verbatim lines, alongside comments and blank lines, so that saving
//! a loaded file never drops them.
//! Saving is atomic: all entries are written to a temporary file in the target directory, which
//! then replaces the target file.
//! A failed save leaves the previous file untouched.

use std::{
    fs::File,
    io::{BufRead, BufReader, BufWriter, ErrorKind, Write},
    path::{Path, PathBuf},
};

use log::{debug, info, warn};
use tempfile::NamedTempFile;

use crate::{
    codec::{DecodeError, EncodeError, decode_line, encode_line, encoded_len},
    store::{EntryStore, Line},
};

/// An error that may occur when loading a known_hosts file.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// An I/O error occurred while reading a file.
    #[error("I/O error while reading {path}: {source}")]
    Io {
        /// The path of the file.
        path: PathBuf,

        /// The source error.
        source: std::io::Error,
    },
}

/// An error that may occur when saving a known_hosts file.
#[derive(Debug, thiserror::Error)]
pub enum SaveError {
    /// An I/O error occurred while writing a file.
    #[error("I/O error while {context} {path}: {source}")]
    Io {
        /// The path of the file.
        path: PathBuf,

        /// The context in which the error occurred.
        ///
        /// This is meant to complete the sentence "I/O error while ".
        context: &'static str,

        /// The source error.
        source: std::io::Error,
    },

    /// An entry can not be encoded.
    #[error("Unable to encode an entry: {0}")]
    Encode(#[from] EncodeError),
}

/// A line of a known_hosts file that could not be decoded.
#[derive(Debug)]
pub struct SkippedLine {
    /// The one-based number of the line.
    pub line_number: usize,

    /// The reason why the line could not be decoded.
    pub error: DecodeError,
}

/// The result of loading a known_hosts file.
#[derive(Debug, Default)]
pub struct LoadedFile {
    /// The decoded entries and the verbatim lines, in file order.
    pub store: EntryStore,

    /// The lines that could not be decoded.
    pub skipped: Vec<SkippedLine>,
}

impl LoadedFile {
    /// Returns the number of lines that could not be decoded.
    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }
}

/// Decodes all lines of `reader` and appends the entries to `loaded`.
fn read_into(reader: impl BufRead, loaded: &mut LoadedFile) -> std::io::Result<()> {
    for (index, line) in reader.split(b'\n').enumerate() {
        let line = line?;
        let line_number = index + 1;
        match decode_line(&line) {
            Ok(Some(entry)) => {
                loaded.store.append(entry);
            }
            Ok(None) => loaded.store.append_verbatim(line),
            Err(error) => {
                debug!("Skipping line {line_number}: {error}");
                loaded.skipped.push(SkippedLine { line_number, error });
                loaded.store.append_verbatim(line);
            }
        }
    }
    Ok(())
}

/// Reads known_hosts lines from `reader`.
///
/// # Errors
///
/// Returns an error if reading from `reader` fails.
///
/// # Examples
///
/// ```
/// use knownhosts::file::read_from;
///
/// # fn main() -> testresult::TestResult {
/// let input = b"# comment\nexample.org ssh-ed25519 AAAACw==\nbroken line\n";
/// let loaded = read_from(&input[..])?;
///
/// assert_eq!(loaded.store.len(), 1);
/// assert_eq!(loaded.skipped_count(), 1);
/// assert_eq!(loaded.skipped[0].line_number, 3);
/// # Ok(())
/// # }
/// ```
pub fn read_from(reader: impl BufRead) -> std::io::Result<LoadedFile> {
    let mut loaded = LoadedFile::default();
    read_into(reader, &mut loaded)?;
    Ok(loaded)
}

/// Loads the known_hosts file at `path`.
///
/// # Errors
///
/// Returns an error if the file does not exist or can not be read.
pub fn load(path: impl AsRef<Path>) -> Result<LoadedFile, LoadError> {
    let path = path.as_ref();
    let io_error = |source: std::io::Error| LoadError::Io {
        path: path.to_path_buf(),
        source,
    };

    let file = File::open(path).map_err(io_error)?;
    let loaded = read_from(BufReader::new(file)).map_err(io_error)?;

    for skipped in &loaded.skipped {
        warn!(
            "Skipped line {} of {}: {}",
            skipped.line_number,
            path.display(),
            skipped.error
        );
    }
    info!(
        "Loaded {} entries from {} ({} lines skipped)",
        loaded.store.len(),
        path.display(),
        loaded.skipped_count()
    );
    Ok(loaded)
}

/// Loads several known_hosts files into one [`LoadedFile`], in the order of `paths`.
///
/// Files that do not exist are ignored.
/// Line numbers of skipped lines refer to the file they were found in.
///
/// # Errors
///
/// Returns an error if an existing file can not be read.
pub fn load_many<P: AsRef<Path>>(paths: impl IntoIterator<Item = P>) -> Result<LoadedFile, LoadError> {
    let mut loaded = LoadedFile::default();

    for path in paths {
        let path = path.as_ref();
        let io_error = |source: std::io::Error| LoadError::Io {
            path: path.to_path_buf(),
            source,
        };

        let file = match File::open(path) {
            Ok(file) => file,
            Err(error) if error.kind() == ErrorKind::NotFound => {
                debug!("Ignoring missing known_hosts file {}", path.display());
                continue;
            }
            Err(error) => return Err(io_error(error)),
        };

        let skipped_before = loaded.skipped.len();
        read_into(BufReader::new(file), &mut loaded).map_err(io_error)?;
        for skipped in &loaded.skipped[skipped_before..] {
            warn!(
                "Skipped line {} of {}: {}",
                skipped.line_number,
                path.display(),
                skipped.error
            );
        }
    }

    Ok(loaded)
}

/// Writes all entries and verbatim lines of `store` into `writer`.
fn write_lines(store: &EntryStore, writer: &mut impl Write) -> Result<(), WriteError> {
    let mut buf = Vec::new();
    for line in store.lines() {
        match line {
            Line::Entry(_, entry) => {
                buf.resize(encoded_len(entry), 0);
                let len = encode_line(entry, &mut buf)?;
                writer.write_all(&buf[..len])?;
            }
            Line::Verbatim(line) => {
                writer.write_all(line)?;
                writer.write_all(b"\n")?;
            }
        }
    }
    Ok(())
}

/// Errors of a single write pass, before a path is attached.
#[derive(Debug)]
enum WriteError {
    Io(std::io::Error),
    Encode(EncodeError),
}

impl From<std::io::Error> for WriteError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error)
    }
}

impl From<EncodeError> for WriteError {
    fn from(error: EncodeError) -> Self {
        Self::Encode(error)
    }
}

/// Atomically replaces the file at `path` with the output of `write`.
///
/// The permissions of an existing file are kept.
/// New files are created with mode `0o644`.
fn write_atomic(
    path: &Path,
    write: impl FnOnce(&mut BufWriter<&File>) -> Result<(), WriteError>,
) -> Result<(), SaveError> {
    let io_error = |context: &'static str| {
        move |source: std::io::Error| SaveError::Io {
            path: path.to_path_buf(),
            context,
            source,
        }
    };

    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent).map_err(io_error("creating the parent directory of"))?;

    let temp_file = NamedTempFile::new_in(parent)
        .map_err(io_error("creating a temporary file for"))?;

    match std::fs::metadata(path) {
        Ok(metadata) => temp_file
            .as_file()
            .set_permissions(metadata.permissions())
            .map_err(io_error("copying the permissions of"))?,
        #[cfg(unix)]
        Err(error) if error.kind() == ErrorKind::NotFound => {
            use std::os::unix::fs::PermissionsExt;

            temp_file
                .as_file()
                .set_permissions(std::fs::Permissions::from_mode(0o644))
                .map_err(io_error("setting the permissions of"))?
        }
        Err(error) if error.kind() == ErrorKind::NotFound => {}
        Err(error) => return Err(io_error("reading the metadata of")(error)),
    }

    {
        let mut writer = BufWriter::new(temp_file.as_file());
        write(&mut writer).map_err(|error| match error {
            WriteError::Io(source) => io_error("writing a temporary file for")(source),
            WriteError::Encode(error) => SaveError::Encode(error),
        })?;
        writer
            .flush()
            .map_err(io_error("writing a temporary file for"))?;
    }
    temp_file
        .as_file()
        .sync_all()
        .map_err(io_error("syncing a temporary file for"))?;

    temp_file
        .persist(path)
        .map_err(|error| io_error("replacing")(error.error))?;
    Ok(())
}

/// Atomically writes all entries of `store` to the file at `path`.
///
/// Comments, blank lines and lines that could not be decoded are written back unchanged, at their
/// original position between the entries.
///
/// # Errors
///
/// Returns an error if the temporary file can not be created, written or moved to `path`.
/// The file at `path` is left untouched in this case.
pub fn save(path: impl AsRef<Path>, store: &EntryStore) -> Result<(), SaveError> {
    let path = path.as_ref();
    write_atomic(path, |writer| write_lines(store, writer))?;
    info!("Saved {} entries to {}", store.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs::read_to_string;

    use rstest::rstest;
    use testdir::testdir;
    use testresult::TestResult;

    use super::*;

    const ED25519_KEY: &str =
        "AAAAC3NzaC1lZDI1NTE5AAAAICjT2SuA0k/xc5Cbyp+eBY5uN3bRL2K7GdpNtltOK6vy";

    fn line(index: usize) -> String {
        format!("host{index}.example.org ssh-ed25519 {ED25519_KEY} comment {index}")
    }

    /// Ensures that a single malformed line does not abort loading.
    #[test]
    fn malformed_line_is_skipped() -> TestResult {
        let path = testdir!().join("known_hosts");
        let mut content = String::new();
        for index in 0..100 {
            if index == 41 {
                content.push_str("host41.example.org ssh-ed25519 ***not base64***\n");
            } else {
                content.push_str(&line(index));
                content.push('\n');
            }
        }
        std::fs::write(&path, content)?;

        let loaded = load(&path)?;
        assert_eq!(loaded.store.len(), 99);
        assert_eq!(loaded.skipped_count(), 1);
        assert_eq!(loaded.skipped[0].line_number, 42);
        assert!(matches!(
            loaded.skipped[0].error,
            DecodeError::BadBase64 { .. }
        ));

        Ok(())
    }

    /// Ensures that saving and loading reproduces entries in order, including comments.
    #[test]
    fn save_and_load_preserve_order() -> TestResult {
        let path = testdir!().join("known_hosts");
        let lines: Vec<String> = (0..10).map(line).collect();
        let original = read_from(lines.join("\n").as_bytes())?;

        save(&path, &original.store)?;
        let reloaded = load(&path)?;

        assert_eq!(
            reloaded.store.entries().collect::<Vec<_>>(),
            original.store.entries().collect::<Vec<_>>()
        );
        assert_eq!(read_to_string(&path)?, format!("{}\n", lines.join("\n")));

        Ok(())
    }

    /// Ensures that comments, blank lines and undecodable lines are written back in place.
    #[test]
    fn save_keeps_verbatim_lines() -> TestResult {
        let path = testdir!().join("known_hosts");
        let original = format!(
            "# my notes\n\n{}\nbroken line\n@cert-authority *.example.org ssh-ed25519 AAAACw==\n{}\n",
            line(0),
            line(1)
        );
        std::fs::write(&path, &original)?;

        let mut loaded = load(&path)?;
        assert_eq!(loaded.store.len(), 3);
        assert_eq!(loaded.skipped_count(), 1);
        save(&path, &loaded.store)?;
        assert_eq!(read_to_string(&path)?, original);

        let Some((first, _)) = loaded.store.iter().next() else {
            panic!("The store should not be empty");
        };
        loaded.store.remove(first)?;
        let Some(entry) = decode_line(line(2).as_bytes())? else {
            panic!("The line should carry an entry");
        };
        loaded.store.append(entry);
        save(&path, &loaded.store)?;

        assert_eq!(
            read_to_string(&path)?,
            format!(
                "# my notes\n\nbroken line\n@cert-authority *.example.org ssh-ed25519 AAAACw==\n{}\n{}\n",
                line(1),
                line(2)
            )
        );

        Ok(())
    }

    /// Ensures that an entry with a non UTF-8 comment is kept when saving.
    #[test]
    fn non_utf8_comment_entry_is_kept() -> TestResult {
        let path = testdir!().join("known_hosts");
        std::fs::write(
            &path,
            b"old.example.org ssh-ed25519 AAAACw== caf\xe9\n# trailer\n",
        )?;

        let loaded = load(&path)?;
        assert_eq!(loaded.store.len(), 1);
        assert_eq!(loaded.skipped_count(), 0);

        save(&path, &loaded.store)?;
        assert_eq!(
            read_to_string(&path)?,
            "old.example.org ssh-ed25519 AAAACw== caf\u{fffd}\n# trailer\n"
        );

        Ok(())
    }

    #[rstest]
    #[case::crlf("example.org ssh-ed25519 AAAACw==\r\n\r\n")]
    #[case::no_trailing_newline("example.org ssh-ed25519 AAAACw==")]
    #[case::comments("# header\n\n   \nexample.org ssh-ed25519 AAAACw==\n# footer")]
    fn read_line_endings(#[case] input: &str) -> TestResult {
        let loaded = read_from(input.as_bytes())?;
        assert_eq!(loaded.store.len(), 1);
        assert_eq!(loaded.skipped_count(), 0);
        Ok(())
    }

    #[test]
    fn load_missing_file_fails() {
        let path = testdir!().join("missing");
        assert!(matches!(load(&path), Err(LoadError::Io { .. })));
    }

    #[test]
    fn load_many_ignores_missing_files() -> TestResult {
        let dir = testdir!();
        let user = dir.join("known_hosts");
        let global = dir.join("ssh_known_hosts");
        std::fs::write(&user, format!("{}\nbroken\n", line(1)))?;
        std::fs::write(&global, format!("{}\n{}\n", line(2), line(3)))?;

        let loaded = load_many([&user, &dir.join("missing"), &global])?;
        assert_eq!(loaded.store.len(), 3);
        assert_eq!(loaded.skipped_count(), 1);
        assert_eq!(
            loaded
                .store
                .entries()
                .filter_map(|entry| entry.comment())
                .collect::<Vec<_>>(),
            ["comment 1", "comment 2", "comment 3"]
        );

        Ok(())
    }

    /// Ensures that a failure while writing leaves the original file untouched.
    #[test]
    fn failed_write_keeps_original_file() -> TestResult {
        let dir = testdir!();
        let path = dir.join("known_hosts");
        let original = format!("{}\n", line(0));
        std::fs::write(&path, &original)?;

        let result = write_atomic(&path, |writer| {
            writer.write_all(b"partial")?;
            Err(WriteError::Io(std::io::Error::other("simulated failure")))
        });

        assert!(matches!(result, Err(SaveError::Io { .. })));
        assert_eq!(read_to_string(&path)?, original);
        assert_eq!(std::fs::read_dir(&dir)?.count(), 1);

        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn save_keeps_permissions() -> TestResult {
        use std::os::unix::fs::PermissionsExt;

        let dir = testdir!();
        let new_file = dir.join("new");
        save(&new_file, &EntryStore::new())?;
        assert_eq!(
            std::fs::metadata(&new_file)?.permissions().mode() & 0o777,
            0o644
        );

        let existing = dir.join("existing");
        std::fs::write(&existing, "")?;
        std::fs::set_permissions(&existing, std::fs::Permissions::from_mode(0o600))?;
        save(&existing, &EntryStore::new())?;
        assert_eq!(
            std::fs::metadata(&existing)?.permissions().mode() & 0o777,
            0o600
        );

        Ok(())
    }

    #[test]
    fn save_creates_parent_directory() -> TestResult {
        let path = testdir!().join(".ssh").join("known_hosts");
        save(&path, &EntryStore::new())?;
        assert_eq!(read_to_string(&path)?, "");
        Ok(())
    }
}
