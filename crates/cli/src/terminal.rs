use async_trait::async_trait;
use drivelink_services::picker::{ConsentPrompt, ConsentResponse, FolderChooser, FolderEntry};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::Mutex;

/// Consent and folder prompts answered on stdin. An empty line cancels.
pub struct TerminalPrompt {
    lines: Mutex<Lines<BufReader<Stdin>>>,
}

impl TerminalPrompt {
    pub fn new() -> Self {
        Self {
            lines: Mutex::new(BufReader::new(tokio::io::stdin()).lines()),
        }
    }

    async fn read_line(&self) -> Option<String> {
        let mut lines = self.lines.lock().await;
        match lines.next_line().await {
            Ok(Some(line)) if !line.trim().is_empty() => Some(line.trim().to_string()),
            _ => None,
        }
    }
}

#[async_trait]
impl ConsentPrompt for TerminalPrompt {
    async fn authorize(&self, authorize_url: &str) -> Option<ConsentResponse> {
        println!("Open this URL to grant Google Drive access:\n\n  {}\n", authorize_url);
        loop {
            println!("Paste the full URL you were redirected to (empty line to cancel):");
            let line = self.read_line().await?;
            if line.contains("error=") {
                return None;
            }
            match ConsentResponse::from_redirect(&line) {
                Some(response) => return Some(response),
                None => println!("That URL has no authorization code."),
            }
        }
    }
}

#[async_trait]
impl FolderChooser for TerminalPrompt {
    async fn choose(&self, folders: &[FolderEntry]) -> Option<usize> {
        if folders.is_empty() {
            println!("No folders found.");
            return None;
        }
        for (index, folder) in folders.iter().enumerate() {
            let location = match &folder.drive_name {
                Some(drive) => format!("Shared Drive: {}", drive),
                None => "My Drive".to_string(),
            };
            println!("  [{}] {} ({})", index + 1, folder.name, location);
        }

        loop {
            println!("Select a folder number (empty line to cancel):");
            let line = self.read_line().await?;
            match line.parse::<usize>() {
                Ok(n) if (1..=folders.len()).contains(&n) => return Some(n - 1),
                _ => println!("'{}' is not a listed folder.", line),
            }
        }
    }
}
