use ratatui::text::Line;
use unicode_width::UnicodeWidthStr;

/// Handles all scroll-related calculations
pub struct ScrollCalculator;

impl ScrollCalculator {
    /// Calculate how many visual lines the given lines take when word-wrapped
    /// to `terminal_width` columns.
    pub fn calculate_wrapped_line_count(lines: &[Line], terminal_width: u16) -> u16 {
        lines
            .iter()
            .map(|line| {
                let text: String = line.spans.iter().map(|span| span.content.as_ref()).collect();
                Self::calculate_word_wrapped_lines(&text, terminal_width)
            })
            .fold(0_u16, u16::saturating_add)
    }

    /// Calculate how many lines a single text string will wrap to
    pub fn calculate_word_wrapped_lines(text: &str, terminal_width: u16) -> u16 {
        let width = terminal_width as usize;
        if width == 0 {
            return 1;
        }

        let mut line_count: u16 = 1;
        let mut current_len = 0_usize;

        for word in text.split_whitespace() {
            let mut word_len = UnicodeWidthStr::width(word);

            // A single space separates words on the same line.
            if current_len > 0 {
                if current_len + 1 > width {
                    line_count = line_count.saturating_add(1);
                    current_len = 0;
                } else {
                    current_len += 1;
                }
            }

            // Overlong words are broken across lines.
            loop {
                let space_left = width.saturating_sub(current_len);
                if word_len <= space_left {
                    current_len += word_len;
                    break;
                }
                word_len -= space_left;
                line_count = line_count.saturating_add(1);
                current_len = 0;
            }
        }

        line_count
    }

    /// Offset that shows the last `available_height` lines.
    pub fn calculate_max_scroll_offset(total_lines: u16, available_height: u16) -> u16 {
        total_lines.saturating_sub(available_height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_short_line() {
        assert_eq!(ScrollCalculator::calculate_word_wrapped_lines("Hello world", 80), 1);
    }

    #[test]
    fn wraps_at_word_boundaries() {
        assert_eq!(
            ScrollCalculator::calculate_word_wrapped_lines("aaaa bbbb cccc", 9),
            2
        );
        assert_eq!(ScrollCalculator::calculate_word_wrapped_lines("aaaa bbbb", 9), 1);
    }

    #[test]
    fn long_word_is_broken() {
        assert_eq!(
            ScrollCalculator::calculate_word_wrapped_lines("abcdefghijklmnopqrstuvwxyz", 10),
            3
        );
    }

    #[test]
    fn wide_characters_count_double() {
        // Each CJK character is two columns wide.
        assert_eq!(ScrollCalculator::calculate_word_wrapped_lines("漢字漢字漢字", 6), 2);
    }

    #[test]
    fn empty_lines_still_take_a_row() {
        let lines = vec![Line::from(""), Line::from("text"), Line::from("")];
        assert_eq!(ScrollCalculator::calculate_wrapped_line_count(&lines, 40), 3);
        assert_eq!(ScrollCalculator::calculate_word_wrapped_lines("anything", 0), 1);
    }

    #[test]
    fn max_offset_never_negative() {
        assert_eq!(ScrollCalculator::calculate_max_scroll_offset(5, 10), 0);
        assert_eq!(ScrollCalculator::calculate_max_scroll_offset(25, 10), 15);
    }
}
