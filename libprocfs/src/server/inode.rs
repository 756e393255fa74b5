use std::collections::HashMap;

/// Inode of the root directory, fixed by the FUSE protocol.
pub const ROOT_INODE: u64 = 1;

/// Stable name <-> inode mapping for the flat namespace. Inodes are handed
/// out on first sight of a name and never reused.
#[derive(Debug)]
pub(crate) struct InodeTable {
    by_name: HashMap<String, u64>,
    by_ino: HashMap<u64, String>,
    next: u64,
}

impl InodeTable {
    pub(crate) fn new() -> Self {
        Self {
            by_name: HashMap::new(),
            by_ino: HashMap::new(),
            next: ROOT_INODE + 1,
        }
    }

    pub(crate) fn ino_of(&mut self, name: &str) -> u64 {
        if let Some(&ino) = self.by_name.get(name) {
            return ino;
        }
        let ino = self.next;
        self.next += 1;
        self.by_name.insert(name.to_string(), ino);
        self.by_ino.insert(ino, name.to_string());
        ino
    }

    pub(crate) fn name_of(&self, ino: u64) -> Option<&str> {
        self.by_ino.get(&ino).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inodes_are_stable() {
        let mut table = InodeTable::new();
        let a = table.ino_of("a");
        let b = table.ino_of("b");
        assert_eq!(a, ROOT_INODE + 1);
        assert_ne!(a, b);
        assert_eq!(table.ino_of("a"), a);
        assert_eq!(table.name_of(b), Some("b"));
        assert_eq!(table.name_of(ROOT_INODE), None);
        assert_eq!(table.name_of(999), None);
    }
}
