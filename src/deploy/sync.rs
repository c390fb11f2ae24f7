// ABOUTME: Mirrors a checkout into a fresh release directory with delete semantics.
// ABOUTME: Filter rules follow rsync's CVS-style defaults, with `core` re-included.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use filetime::FileTime;
use globset::{GlobBuilder, GlobMatcher};
use walkdir::WalkDir;

use super::error::DeployError;
use super::log::DeploymentLog;

/// Project-supplied extra exclude rules, relative to the checkout.
pub const EXCLUDE_FILE: &str = "deployment/rsync_exclude.txt";

/// rsync's `--cvs-exclude` list.
const CVS_EXCLUDES: &[&str] = &[
    "RCS", "SCCS", "CVS", "CVS.adm", "RCSLOG", "cvslog.*", "tags", "TAGS", ".make.state",
    ".nse_depinfo", "*~", "#*", ".#*", ",*", "_$*", "*$", "*.old", "*.bak", "*.BAK", "*.orig",
    "*.rej", ".del-*", "*.a", "*.olb", "*.o", "*.obj", "*.so", "*.exe", "*.Z", "*.elc", "*.ln",
    "core", ".svn/", ".git/", ".hg/", ".bzr/",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Include,
    Exclude,
}

#[derive(Debug, Clone)]
struct Rule {
    action: Action,
    matcher: GlobMatcher,
    /// Match the whole relative path instead of just the final component.
    full_path: bool,
    dir_only: bool,
}

impl Rule {
    fn parse(action: Action, pattern: &str) -> Result<Self, globset::Error> {
        let (pattern, dir_only) = match pattern.strip_suffix('/') {
            Some(p) => (p, true),
            None => (pattern, false),
        };
        let full_path = pattern.contains('/');
        let pattern = pattern.trim_start_matches('/');
        let matcher = GlobBuilder::new(pattern)
            .literal_separator(true)
            .build()?
            .compile_matcher();
        Ok(Self {
            action,
            matcher,
            full_path,
            dir_only,
        })
    }

    fn matches(&self, rel: &Path, is_dir: bool) -> bool {
        if self.dir_only && !is_dir {
            return false;
        }
        if self.full_path {
            self.matcher.is_match(rel)
        } else {
            rel.file_name()
                .is_some_and(|name| self.matcher.is_match(Path::new(name)))
        }
    }
}

/// Ordered include/exclude rules. The first matching rule decides.
#[derive(Debug, Clone)]
pub struct ExcludeRules {
    rules: Vec<Rule>,
}

impl ExcludeRules {
    /// Version-control metadata excluded, a `core` directory kept.
    pub fn defaults() -> Self {
        let mut rules = Vec::with_capacity(CVS_EXCLUDES.len() + 1);
        rules.extend(Rule::parse(Action::Include, "core/"));
        rules.extend(
            CVS_EXCLUDES
                .iter()
                .filter_map(|p| Rule::parse(Action::Exclude, p).ok()),
        );
        Self { rules }
    }

    /// Parse a rules file: one pattern per line, `- ` or `+ ` prefixes
    /// select exclude or include, bare patterns exclude. Lines starting with
    /// `#` or `;` are comments.
    pub fn parse(content: &str) -> Result<Self, globset::Error> {
        let mut rules = Vec::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            let (action, pattern) = if let Some(p) = line.strip_prefix("+ ") {
                (Action::Include, p.trim())
            } else if let Some(p) = line.strip_prefix("- ") {
                (Action::Exclude, p.trim())
            } else {
                (Action::Exclude, line)
            };
            rules.push(Rule::parse(action, pattern)?);
        }
        Ok(Self { rules })
    }

    /// Project rules from `checkout`, ahead of the defaults.
    pub fn load(checkout: &Path) -> io::Result<Self> {
        let mut rules = match fs::read_to_string(checkout.join(EXCLUDE_FILE)) {
            Ok(content) => Self::parse(&content)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => Self { rules: Vec::new() },
            Err(e) => return Err(e),
        };
        rules.rules.extend(Self::defaults().rules);
        Ok(rules)
    }

    pub fn is_excluded(&self, rel: &Path, is_dir: bool) -> bool {
        self.rules
            .iter()
            .find(|rule| rule.matches(rel, is_dir))
            .is_some_and(|rule| rule.action == Action::Exclude)
    }
}

/// What a mirror pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MirrorStats {
    pub files: usize,
    pub dirs: usize,
    pub symlinks: usize,
    pub deleted: usize,
}

/// Make `dest` an exact copy of `src`, minus excluded entries.
///
/// Entries in `dest` with no counterpart in `src` are removed unless they are
/// themselves excluded. Symlinks are copied as links.
pub fn mirror(src: &Path, dest: &Path, rules: &ExcludeRules) -> io::Result<MirrorStats> {
    let mut stats = MirrorStats::default();
    let mut seen = HashSet::new();
    let mut dirs = Vec::new();

    fs::create_dir_all(dest)?;

    let walker = WalkDir::new(src)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !excluded(src, entry, rules));

    for entry in walker {
        let entry = entry.map_err(io::Error::other)?;
        let rel = relative(src, entry.path())?;
        let target = dest.join(&rel);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            if target.symlink_metadata().is_ok_and(|m| !m.is_dir()) {
                fs::remove_file(&target)?;
            }
            fs::create_dir_all(&target)?;
            dirs.push((entry.path().to_path_buf(), target));
            stats.dirs += 1;
        } else if file_type.is_symlink() {
            remove_existing(&target)?;
            std::os::unix::fs::symlink(fs::read_link(entry.path())?, &target)?;
            stats.symlinks += 1;
        } else {
            if target.symlink_metadata().is_ok_and(|m| m.is_dir()) {
                fs::remove_dir_all(&target)?;
            }
            fs::copy(entry.path(), &target)?;
            let meta = entry.metadata().map_err(io::Error::other)?;
            filetime::set_file_mtime(&target, FileTime::from_last_modification_time(&meta))?;
            stats.files += 1;
        }
        seen.insert(rel);
    }

    stats.deleted = delete_extraneous(dest, &seen, rules)?;

    // Deepest first so setting a parent's mtime is not undone by its children.
    for (source, target) in dirs.into_iter().rev() {
        let meta = fs::metadata(&source)?;
        fs::set_permissions(&target, meta.permissions())?;
        filetime::set_file_mtime(&target, FileTime::from_last_modification_time(&meta))?;
    }

    Ok(stats)
}

fn excluded(base: &Path, entry: &walkdir::DirEntry, rules: &ExcludeRules) -> bool {
    match entry.path().strip_prefix(base) {
        Ok(rel) => rules.is_excluded(rel, entry.file_type().is_dir()),
        Err(_) => false,
    }
}

fn relative(base: &Path, path: &Path) -> io::Result<PathBuf> {
    path.strip_prefix(base)
        .map(Path::to_path_buf)
        .map_err(io::Error::other)
}

fn remove_existing(path: &Path) -> io::Result<()> {
    match path.symlink_metadata() {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

fn delete_extraneous(
    dest: &Path,
    seen: &HashSet<PathBuf>,
    rules: &ExcludeRules,
) -> io::Result<usize> {
    let mut deleted = 0;
    let walker = WalkDir::new(dest)
        .min_depth(1)
        .follow_links(false)
        .contents_first(true)
        .into_iter()
        .filter_entry(|entry| !excluded(dest, entry, rules));

    for entry in walker {
        let entry = entry.map_err(io::Error::other)?;
        let rel = relative(dest, entry.path())?;
        if seen.contains(&rel) {
            continue;
        }
        remove_existing(entry.path())?;
        deleted += 1;
    }
    Ok(deleted)
}

/// Mirror `checkout` into the new release directory.
pub async fn mirror_release(
    checkout: &Path,
    release: &Path,
    log: &DeploymentLog,
) -> Result<MirrorStats, DeployError> {
    log.line(format!(
        "Syncing {} -> {}",
        checkout.display(),
        release.display()
    ));

    let src = checkout.to_path_buf();
    let dest = release.to_path_buf();
    let stats = tokio::task::spawn_blocking(move || {
        let rules = ExcludeRules::load(&src)?;
        mirror(&src, &dest, &rules)
    })
    .await
    .map_err(io::Error::other)
    .and_then(|r| r)
    .map_err(DeployError::Sync)?;

    log.line(format!(
        "Synced {} files, {} directories, {} links",
        stats.files, stats.dirs, stats.symlinks
    ));
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_exclude_vcs_metadata() {
        let rules = ExcludeRules::defaults();
        assert!(rules.is_excluded(Path::new(".git"), true));
        assert!(rules.is_excluded(Path::new("vendor/lib/.svn"), true));
        assert!(rules.is_excluded(Path::new("src/main.o"), false));
        assert!(rules.is_excluded(Path::new("notes.txt~"), false));
        assert!(!rules.is_excluded(Path::new("src/main.rs"), false));
        // `.git/` only applies to directories (worktree files are plain files).
        assert!(!rules.is_excluded(Path::new(".git"), false));
    }

    #[test]
    fn core_directory_is_kept() {
        let rules = ExcludeRules::defaults();
        assert!(!rules.is_excluded(Path::new("lib/core"), true));
        assert!(rules.is_excluded(Path::new("core"), false));
    }

    #[test]
    fn project_rules_come_first() {
        let mut rules =
            ExcludeRules::parse("# comment\nnode_modules/\n/secrets.yml\n+ *.bak\n").unwrap();
        rules.rules.extend(ExcludeRules::defaults().rules);

        assert!(rules.is_excluded(Path::new("node_modules"), true));
        assert!(rules.is_excluded(Path::new("secrets.yml"), false));
        assert!(!rules.is_excluded(Path::new("config/secrets.yml"), false));
        assert!(!rules.is_excluded(Path::new("dump.bak"), false));
    }

    #[test]
    fn mirror_copies_and_deletes() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        let dest = dir.path().join("dest");
        fs::create_dir_all(src.join(".git")).unwrap();
        fs::create_dir_all(src.join("app/core")).unwrap();
        fs::write(src.join(".git/HEAD"), "ref").unwrap();
        fs::write(src.join("app/core/init.js"), "init").unwrap();
        fs::write(src.join("index.js"), "main").unwrap();
        std::os::unix::fs::symlink("index.js", src.join("entry.js")).unwrap();

        fs::create_dir_all(dest.join("gone")).unwrap();
        fs::write(dest.join("gone/old.txt"), "old").unwrap();

        let stats = mirror(&src, &dest, &ExcludeRules::defaults()).unwrap();

        assert_eq!(fs::read_to_string(dest.join("index.js")).unwrap(), "main");
        assert_eq!(fs::read_to_string(dest.join("app/core/init.js")).unwrap(), "init");
        assert_eq!(fs::read_link(dest.join("entry.js")).unwrap(), Path::new("index.js"));
        assert!(!dest.join(".git").exists());
        assert!(!dest.join("gone").exists());
        assert_eq!(stats.files, 2);
        assert_eq!(stats.symlinks, 1);
        assert_eq!(stats.deleted, 2);
    }
}
