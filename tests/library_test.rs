use gogshelf::Library;
use std::fs;
use tempfile::TempDir;

#[test]
fn detects_downloaded_games_by_folder_slug() {
    let dir = TempDir::new().unwrap();
    fs::create_dir(dir.path().join("the_witcher_3_wild_hunt")).unwrap();
    fs::write(dir.path().join("stray_file.bin"), b"x").unwrap();

    let library = Library::new(dir.path());
    assert!(library.is_downloaded("The Witcher 3: Wild Hunt™"));
    assert!(library.is_downloaded("the-witcher-3  wild_hunt"));
    assert!(!library.is_downloaded("Cyberpunk 2077"));
    assert!(!library.is_downloaded(""));
}

#[test]
fn lists_downloaded_folders_sorted() {
    let dir = TempDir::new().unwrap();
    fs::create_dir(dir.path().join("zork")).unwrap();
    fs::create_dir(dir.path().join("anachronox")).unwrap();
    fs::write(dir.path().join("notes.txt"), b"x").unwrap();

    let library = Library::new(dir.path());
    assert_eq!(
        library.downloaded_titles(),
        vec!["anachronox".to_string(), "zork".to_string()]
    );
}

#[test]
fn missing_download_directory_is_empty() {
    let library = Library::new("/definitely/not/a/real/path");
    assert!(library.downloaded_titles().is_empty());
    assert!(!library.is_downloaded("anything"));
}
