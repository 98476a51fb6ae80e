const SAVED_URLS_FILE: &str = "saved-urls.json";
const PROFILE_DIR_NAME: &str = "ChromeProfile";

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("sitewalk")
}

fn default_urls_path() -> PathBuf {
    default_data_dir().join(SAVED_URLS_FILE)
}

fn default_profile_dir() -> PathBuf {
    default_data_dir().join(PROFILE_DIR_NAME)
}

fn load_urls(path: &Path) -> UrlListResponse {
    match read_url_list(path) {
        Ok(urls) => UrlListResponse {
            success: true,
            urls,
            error: None,
        },
        Err(err) => {
            warn!(path = %path.display(), "failed to load saved urls: {err}");
            UrlListResponse {
                success: false,
                urls: Vec::new(),
                error: Some(err.to_string()),
            }
        }
    }
}

fn read_url_list(path: &Path) -> io::Result<Vec<String>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err),
    };
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str::<Vec<String>>(&content)
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err.to_string()))
}

fn save_urls(path: &Path, urls: &[String]) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(urls)
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err.to_string()))?;
    fs::write(path, json)?;
    info!(path = %path.display(), count = urls.len(), "saved urls");
    Ok(())
}

#[cfg(test)]
mod data_io_tests {
    use super::*;

    #[test]
    fn missing_file_loads_as_empty_list() {
        let dir = tempfile::tempdir().unwrap();
        let response = load_urls(&dir.path().join("nothing.json"));
        assert!(response.success);
        assert!(response.urls.is_empty());
        assert_eq!(response.error, None);
    }

    #[test]
    fn saved_urls_load_back_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(SAVED_URLS_FILE);
        let urls = vec!["https://b.test/".to_string(), "https://a.test/".to_string()];
        save_urls(&path, &urls).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains('\n'));
        let response = load_urls(&path);
        assert!(response.success);
        assert_eq!(response.urls, urls);
    }

    #[test]
    fn malformed_file_reports_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SAVED_URLS_FILE);
        fs::write(&path, "{\"urls\": 3}").unwrap();
        let response = load_urls(&path);
        assert!(!response.success);
        assert!(response.urls.is_empty());
        assert!(response.error.is_some());
    }

    #[test]
    fn default_paths_share_the_data_dir() {
        assert!(default_urls_path().ends_with("sitewalk/saved-urls.json"));
        assert!(default_profile_dir().ends_with("sitewalk/ChromeProfile"));
    }
}
