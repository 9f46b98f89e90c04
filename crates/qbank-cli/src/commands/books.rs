//! Books commands - list, save and delete books

use anyhow::Result;
use qbank_client::{Book, BookDraft, QbankClient};

use crate::output::{BookRow, OutputContext};

impl From<Book> for BookRow {
    fn from(book: Book) -> Self {
        Self {
            split: format!(
                "{}% ({}/{})",
                book.split_percent(),
                book.processed_segments,
                book.total_segments
            ),
            embed: format!(
                "{}% ({}/{})",
                book.embed_percent(),
                book.imported_fragments,
                book.total_fragments
            ),
            status: book.status.unwrap_or_else(|| "unknown".to_string()),
            id: book.book_id,
            name: book.book_name,
            file: book.file_path,
        }
    }
}

/// List all books with their import progress
pub async fn books_list(client: &QbankClient, ctx: &OutputContext) -> Result<()> {
    let books = client.list_books().await?;
    let rows: Vec<BookRow> = books.into_iter().map(BookRow::from).collect();
    ctx.print(&rows);
    Ok(())
}

/// Create a book, or update it when an id is given
pub async fn books_save(
    client: &QbankClient,
    draft: BookDraft,
    ctx: &OutputContext,
) -> Result<()> {
    let message = client.save_book(&draft).await?;
    ctx.success(&message.unwrap_or_else(|| format!("Saved '{}'", draft.book_name)));
    Ok(())
}

/// Delete a book
pub async fn books_delete(client: &QbankClient, book_id: i64, ctx: &OutputContext) -> Result<()> {
    client.delete_book(book_id).await?;
    ctx.success(&format!("Deleted book {}", book_id));
    Ok(())
}
