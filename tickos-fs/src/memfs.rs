//! Flat in-memory file system

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use hashbrown::HashMap;
use tickos_api::{
    Fd, FileInfo, FileSystem, FsError, FsResult, OpenMode, Permissions, Terminal, STDIN_FILENO,
    STDOUT_FILENO,
};

use crate::image::{self, ImageError};

/// First handle handed out by `open`
const FIRST_FILE_FD: Fd = 2;

#[derive(Debug, Clone, Default)]
struct FileNode {
    data: Vec<u8>,
    permissions: Permissions,
}

impl FileNode {
    fn info(&self, name: &str) -> FileInfo {
        FileInfo {
            name: name.to_string(),
            size: self.data.len(),
            permissions: self.permissions,
        }
    }
}

#[derive(Debug, Clone)]
struct OpenFile {
    path: String,
    mode: OpenMode,
    offset: usize,
}

impl OpenFile {
    fn writes(&self) -> bool {
        matches!(self.mode, OpenMode::Write | OpenMode::Append)
    }
}

/// In-memory files plus the terminal.
///
/// A file has at most one writer at a time; a second `Write`/`Append`
/// open fails with `Busy`, as does unlinking a file that is open.
///
/// A `MemFs` can be bound to a host image: it starts with the image's
/// files and writes them back on every `sync`.
pub struct MemFs {
    files: BTreeMap<String, FileNode>,
    open: HashMap<Fd, OpenFile>,
    terminal: Box<dyn Terminal>,
    image: Option<PathBuf>,
}

impl MemFs {
    pub fn new<T: Terminal + 'static>(terminal: T) -> Self {
        Self {
            files: BTreeMap::new(),
            open: HashMap::new(),
            terminal: Box::new(terminal),
            image: None,
        }
    }

    /// A file system bound to the image at `path`. A missing image starts
    /// empty and is created on the first sync.
    pub fn with_image<T: Terminal + 'static, P: Into<PathBuf>>(
        terminal: T,
        path: P,
    ) -> Result<Self, ImageError> {
        let path = path.into();
        let mut fs = Self::new(terminal);
        if path.exists() {
            fs.load_image(&path)?;
            log::info!("mounted {} files from {}", fs.files.len(), path.display());
        } else {
            log::info!("image {} does not exist yet, starting empty", path.display());
        }
        fs.image = Some(path);
        Ok(fs)
    }

    /// Image this file system syncs to
    pub fn image_path(&self) -> Option<&Path> {
        self.image.as_deref()
    }

    /// Replaces every file with the contents of the image at `path`. A
    /// handle left open on a file the image lacks reports `NotFound`.
    pub fn load_image(&mut self, path: &Path) -> Result<(), ImageError> {
        let entries = image::decode(&std::fs::read(path)?)?;
        let mut files = BTreeMap::new();
        for (name, permissions, data) in entries {
            if validate_name(&name).is_err() {
                return Err(ImageError::BadEntry(name));
            }
            files.insert(name, FileNode { data, permissions });
        }
        self.files = files;
        Ok(())
    }

    /// Writes every file to the image at `path`
    pub fn save_image(&self, path: &Path) -> Result<(), ImageError> {
        let entries = self
            .files
            .iter()
            .map(|(name, node)| (name.as_str(), node.permissions, node.data.as_slice()));
        image::write(path, &image::encode(entries)?)
    }

    /// Creates or replaces a file with `data`, bypassing permissions
    pub fn insert(&mut self, path: &str, data: &[u8]) -> FsResult<()> {
        validate_name(path)?;
        let node = self.files.entry(path.to_string()).or_default();
        node.data = data.to_vec();
        Ok(())
    }

    /// Number of handles currently open, terminal excluded
    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    fn is_open(&self, path: &str) -> bool {
        self.open.values().any(|file| file.path == path)
    }

    fn has_writer(&self, path: &str) -> bool {
        self.open.values().any(|file| file.path == path && file.writes())
    }

    fn lowest_free_fd(&self) -> Fd {
        (FIRST_FILE_FD..)
            .find(|fd| !self.open.contains_key(fd))
            .unwrap_or(FIRST_FILE_FD)
    }

    fn node(&self, path: &str) -> FsResult<&FileNode> {
        self.files.get(path).ok_or(FsError::NotFound)
    }
}

fn validate_name(path: &str) -> FsResult<()> {
    let bad = path.is_empty()
        || path == "."
        || path == ".."
        || path.chars().any(|c| c == '/' || c.is_whitespace() || c.is_control());
    if bad {
        Err(FsError::InvalidName)
    } else {
        Ok(())
    }
}

impl FileSystem for MemFs {
    fn open(&mut self, path: &str, mode: OpenMode) -> FsResult<Fd> {
        validate_name(path)?;
        let offset = match mode {
            OpenMode::Read => {
                let node = self.node(path)?;
                if !node.permissions.contains(Permissions::READ) {
                    return Err(FsError::PermissionDenied);
                }
                0
            }
            OpenMode::Write | OpenMode::Append => {
                if let Some(node) = self.files.get(path) {
                    if !node.permissions.contains(Permissions::WRITE) {
                        return Err(FsError::PermissionDenied);
                    }
                }
                if self.has_writer(path) {
                    return Err(FsError::Busy);
                }
                let node = self.files.entry(path.to_string()).or_default();
                if mode == OpenMode::Write {
                    node.data.clear();
                }
                node.data.len()
            }
        };

        let fd = self.lowest_free_fd();
        self.open.insert(
            fd,
            OpenFile {
                path: path.to_string(),
                mode,
                offset,
            },
        );
        log::trace!("open {path} as {fd} ({mode:?})");
        Ok(fd)
    }

    fn close(&mut self, fd: Fd) -> FsResult<()> {
        if fd == STDIN_FILENO || fd == STDOUT_FILENO {
            return Ok(());
        }
        self.open.remove(&fd).map(|_| ()).ok_or(FsError::BadHandle)
    }

    fn read(&mut self, fd: Fd, n: usize) -> FsResult<Vec<u8>> {
        if fd == STDIN_FILENO {
            return self.terminal.read(n);
        }
        let file = self.open.get_mut(&fd).ok_or(FsError::BadHandle)?;
        if file.mode != OpenMode::Read {
            return Err(FsError::BadHandle);
        }
        let node = self.files.get(&file.path).ok_or(FsError::NotFound)?;
        let start = file.offset.min(node.data.len());
        let end = start.saturating_add(n).min(node.data.len());
        file.offset = end;
        Ok(node.data[start..end].to_vec())
    }

    fn write(&mut self, fd: Fd, bytes: &[u8]) -> FsResult<usize> {
        if fd == STDOUT_FILENO {
            return self.terminal.write(bytes);
        }
        let file = self.open.get_mut(&fd).ok_or(FsError::BadHandle)?;
        if !file.writes() {
            return Err(FsError::BadHandle);
        }
        let node = self.files.get_mut(&file.path).ok_or(FsError::NotFound)?;
        if file.mode == OpenMode::Append {
            file.offset = node.data.len();
        }
        let end = file.offset + bytes.len();
        if node.data.len() < end {
            node.data.resize(end, 0);
        }
        node.data[file.offset..end].copy_from_slice(bytes);
        file.offset = end;
        Ok(bytes.len())
    }

    fn unlink(&mut self, path: &str) -> FsResult<()> {
        self.node(path)?;
        if self.is_open(path) {
            return Err(FsError::Busy);
        }
        self.files.remove(path);
        Ok(())
    }

    fn rename(&mut self, from: &str, to: &str) -> FsResult<()> {
        validate_name(to)?;
        self.node(from)?;
        if from == to {
            return Ok(());
        }
        if self.is_open(to) {
            return Err(FsError::Busy);
        }
        if let Some(node) = self.files.remove(from) {
            self.files.insert(to.to_string(), node);
        }
        for file in self.open.values_mut().filter(|file| file.path == from) {
            file.path = to.to_string();
        }
        Ok(())
    }

    fn touch(&mut self, path: &str) -> FsResult<()> {
        validate_name(path)?;
        self.files.entry(path.to_string()).or_default();
        Ok(())
    }

    fn chmod(&mut self, path: &str, permissions: Permissions) -> FsResult<()> {
        let node = self.files.get_mut(path).ok_or(FsError::NotFound)?;
        node.permissions = permissions;
        Ok(())
    }

    fn stat(&self, path: &str) -> FsResult<FileInfo> {
        self.node(path).map(|node| node.info(path))
    }

    fn list(&self) -> Vec<FileInfo> {
        self.files.iter().map(|(name, node)| node.info(name)).collect()
    }

    fn sync(&mut self) -> FsResult<()> {
        let Some(path) = &self.image else {
            return Ok(());
        };
        self.save_image(path).map_err(|err| {
            log::error!("saving image {}: {err}", path.display());
            FsError::Storage
        })?;
        log::debug!("synced {} files to {}", self.files.len(), path.display());
        Ok(())
    }
}
