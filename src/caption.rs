//! Caption assembly for platform posts.

/// Maximum post length shared by the target platforms.
pub const MAX_POST_LEN: usize = 300;

/// Build a post caption: the connection's prefix, a blank line, then the
/// entry's category tags as hashtags.
///
/// Tag appending stops once the length budget would be exceeded; earlier
/// tags keep their place, later ones are dropped rather than truncated
/// mid-word.
#[must_use]
pub fn build_caption(prefix: &str, tags: &[String], max_len: usize) -> String {
    let mut caption = String::new();
    caption.push_str(prefix);
    caption.push_str("\n\n");

    let mut count = caption.len();
    for tag in tags {
        let tag_text = format!("#{tag}");
        if count + tag_text.len() + 1 <= max_len {
            caption.push_str(&tag_text);
            caption.push(' ');
            count += tag_text.len() + 1;
        }
    }

    caption
}
