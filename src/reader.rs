//! The semantic reader: turns an element into an ordered token sequence.
//!
//! Three strategies, selected by role when the reader is constructed:
//! rows/columns/cells pass through to their children's summaries, tables and
//! outlines read as containers (counts and selected children on top of the
//! generic reading), everything else reads generically. Also hosts the
//! incremental deltas driven by title/value/selection change events.

use tracing::trace;

use crate::error::AxResult;
use crate::gateway::{Attr, Gateway, GatewayExt, Query};
use crate::input::{keycode, KeyState, ModifierKey};
use crate::role::Role;
use crate::tokens::OutputToken;
use crate::value::{AxValue, TextRange};

/// Reading strategy, fixed at construction from the element's role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Generic,
    Container,
    PassThrough,
}

/// A role-dispatched reader over one element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reader {
    strategy: Strategy,
}

impl Reader {
    pub fn for_role(role: &Role) -> Reader {
        let strategy = match role {
            Role::Row | Role::Column | Role::Cell => Strategy::PassThrough,
            Role::Outline | Role::Table => Strategy::Container,
            _ => Strategy::Generic,
        };
        Reader { strategy }
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// Full reading: label, value, role, state, help; containers append their
    /// selected children.
    pub fn read<G: Gateway>(&self, gw: &G, element: &G::Element) -> AxResult<Vec<OutputToken>> {
        let mut tokens = read_label(gw, element)?;
        tokens.extend(read_value(gw, element)?);
        tokens.extend(read_role(gw, element)?);
        tokens.extend(read_state(gw, element)?);
        tokens.extend(read_help(gw, element)?);
        if self.strategy == Strategy::Container {
            tokens.extend(read_selected_children(gw, element)?);
        }
        trace!(?tokens, "read");
        Ok(tokens)
    }

    /// Condensed reading: label and value only; containers add their row and
    /// column counts, pass-throughs yield their children's summaries instead.
    pub fn read_summary<G: Gateway>(
        &self,
        gw: &G,
        element: &G::Element,
    ) -> AxResult<Vec<OutputToken>> {
        match self.strategy {
            Strategy::PassThrough => {
                let mut tokens = Vec::new();
                for child in gw.ordered_children(element)? {
                    let reader = Reader::for_role(&gw.role(&child)?);
                    tokens.extend(reader.read_summary(gw, &child)?);
                }
                Ok(tokens)
            }
            Strategy::Generic | Strategy::Container => {
                let mut tokens = read_label(gw, element)?;
                tokens.extend(read_value(gw, element)?);
                if self.strategy == Strategy::Container {
                    if let Some(AxValue::Array(rows)) = gw.attribute(element, Attr::Rows)? {
                        tokens.push(OutputToken::RowCount(rows.len() as i64));
                    }
                    if let Some(AxValue::Array(cols)) = gw.attribute(element, Attr::Columns)? {
                        tokens.push(OutputToken::ColumnCount(cols.len() as i64));
                    }
                }
                Ok(tokens)
            }
        }
    }
}

fn read_label<G: Gateway>(gw: &G, element: &G::Element) -> AxResult<Vec<OutputToken>> {
    if let Some(title) = gw.text_attr(element, Attr::Title)? {
        return Ok(vec![OutputToken::Label(title)]);
    }
    if let Some(title_el) = gw.element_attr(element, Attr::TitleElement)? {
        if let Some(title) = gw.text_attr(&title_el, Attr::Title)? {
            return Ok(vec![OutputToken::Label(title)]);
        }
    }
    if let Some(description) = gw.text_attr(element, Attr::Description)? {
        return Ok(vec![OutputToken::Label(description)]);
    }
    Ok(Vec::new())
}

fn read_value<G: Gateway>(gw: &G, element: &G::Element) -> AxResult<Vec<OutputToken>> {
    let mut tokens = Vec::new();

    if let Some(vd) = gw.text_attr(element, Attr::ValueDescription)? {
        tokens.push(OutputToken::StringValue(vd));
    } else if let Some(value) = gw.attribute(element, Attr::Value)? {
        match value {
            AxValue::Bool(b) => tokens.push(OutputToken::BoolValue(b)),
            AxValue::Int(i) => tokens.push(OutputToken::IntValue(i)),
            AxValue::Float(f) => tokens.push(OutputToken::FloatValue(f)),
            AxValue::Str(s) | AxValue::AttrStr(s) => {
                tokens.push(OutputToken::StringValue(s));
                if let Some(sel) = gw.text_attr(element, Attr::SelectedText)? {
                    tokens.push(OutputToken::SelectedText(sel));
                }
            }
            AxValue::Url(u) => tokens.push(OutputToken::UrlValue(u)),
            _ => {}
        }
    }

    if gw.bool_attr(element, Attr::Edited)? {
        tokens.push(OutputToken::Edited);
    }
    if let Some(placeholder) = gw.text_attr(element, Attr::Placeholder)? {
        tokens.push(OutputToken::PlaceholderValue(placeholder));
    }
    Ok(tokens)
}

fn read_role<G: Gateway>(gw: &G, element: &G::Element) -> AxResult<Vec<OutputToken>> {
    // A non-empty description already carried the role.
    if gw.text_attr(element, Attr::Description)?.is_some() {
        return Ok(Vec::new());
    }
    Ok(gw
        .text_attr(element, Attr::RoleDescription)?
        .map(|rd| vec![OutputToken::Role(rd)])
        .unwrap_or_default())
}

fn read_state<G: Gateway>(gw: &G, element: &G::Element) -> AxResult<Vec<OutputToken>> {
    let mut tokens = Vec::new();
    if gw.bool_attr(element, Attr::Selected)? {
        tokens.push(OutputToken::Selected);
    }
    // Disabled only when the attribute is present and explicitly false.
    if let Some(AxValue::Bool(false)) = gw.attribute(element, Attr::Enabled)? {
        tokens.push(OutputToken::Disabled);
    }
    Ok(tokens)
}

fn read_help<G: Gateway>(gw: &G, element: &G::Element) -> AxResult<Vec<OutputToken>> {
    Ok(gw
        .text_attr(element, Attr::Help)?
        .map(|h| vec![OutputToken::Help(h)])
        .unwrap_or_default())
}

/// Selected children of a container: one selected child is summarized in
/// place, several collapse to a count.
fn read_selected_children<G: Gateway>(
    gw: &G,
    element: &G::Element,
) -> AxResult<Vec<OutputToken>> {
    let mut selected = Vec::new();
    for attr in [
        Attr::SelectedChildren,
        Attr::SelectedCells,
        Attr::SelectedRows,
        Attr::SelectedColumns,
    ] {
        selected = gw.elements_attr(element, attr)?;
        if !selected.is_empty() {
            break;
        }
    }
    match selected.len() {
        0 => Ok(Vec::new()),
        1 => {
            let child = &selected[0];
            let reader = Reader::for_role(&gw.role(child)?);
            reader.read_summary(gw, child)
        }
        n => Ok(vec![OutputToken::SelectedChildrenCount(n as i64)]),
    }
}

fn string_for_range<G: Gateway>(
    gw: &G,
    element: &G::Element,
    range: TextRange,
) -> AxResult<Option<String>> {
    Ok(gw
        .query(element, Query::StringForRange, AxValue::Range(range))?
        .and_then(|v| v.as_str().map(str::to_string)))
}

/// Tokens describing a text-selection change from `old` to `new`.
///
/// Requires the live key state: an unchanged selection plus a held arrow key
/// means the caret hit a boundary, and a caret moved by a vertical arrow
/// reads the whole new line.
pub fn selection_delta<G: Gateway>(
    gw: &G,
    element: &G::Element,
    old: TextRange,
    new: TextRange,
    keys: &dyn KeyState,
) -> AxResult<Vec<OutputToken>> {
    if old == new {
        let arrow_down = [keycode::LEFT, keycode::RIGHT, keycode::DOWN, keycode::UP]
            .iter()
            .any(|&k| keys.is_key_down(k));
        return Ok(if arrow_down {
            vec![OutputToken::Boundary]
        } else {
            Vec::new()
        });
    }

    if old.is_empty() && new.is_empty() {
        // Caret movement. Vertical arrows read the landing line; anything
        // else reads the text crossed by the move.
        let vertical = (keys.is_key_down(keycode::DOWN) || keys.is_key_down(keycode::UP))
            && !keys.is_modifier_down(ModifierKey::Option);
        let range = if vertical {
            let line = gw
                .query(element, Query::LineForIndex, AxValue::Int(new.start))?
                .and_then(|v| v.as_int());
            match line {
                Some(line) => gw
                    .query(element, Query::RangeForLine, AxValue::Int(line))?
                    .and_then(|v| v.as_range()),
                None => None,
            }
        } else {
            Some(TextRange::span(
                old.start.min(new.start),
                old.end().max(new.end()),
            ))
        };
        let Some(range) = range else { return Ok(Vec::new()) };
        return Ok(string_for_range(gw, element, range)?
            .map(|s| vec![OutputToken::StringValue(s)])
            .unwrap_or_default());
    }

    if old.start == new.start {
        // Right-edge change.
        let extending = new.end() > old.end();
        let delta = TextRange::span(old.end().min(new.end()), old.end().max(new.end()));
        let Some(text) = string_for_range(gw, element, delta)? else {
            return Ok(Vec::new());
        };
        return Ok(if extending {
            vec![OutputToken::SelectedTextGrew(text), OutputToken::Selected]
        } else {
            vec![OutputToken::SelectedTextShrank(text), OutputToken::Unselected]
        });
    }

    if old.end() == new.end() {
        // Left-edge change.
        let extending = new.start < old.start;
        let delta = TextRange::span(old.start.min(new.start), old.start.max(new.start));
        let Some(text) = string_for_range(gw, element, delta)? else {
            return Ok(Vec::new());
        };
        return Ok(if extending {
            vec![OutputToken::SelectedTextGrew(text), OutputToken::Selected]
        } else {
            vec![OutputToken::SelectedTextShrank(text), OutputToken::Unselected]
        });
    }

    // Both edges moved: the old selection is gone, the new one replaces it.
    let mut tokens = Vec::new();
    if let Some(old_text) = string_for_range(gw, element, old)? {
        tokens.push(OutputToken::StringValue(old_text));
        tokens.push(OutputToken::Unselected);
    }
    if let Some(new_text) = string_for_range(gw, element, new)? {
        tokens.push(OutputToken::StringValue(new_text));
        tokens.push(OutputToken::Selected);
    }
    Ok(tokens)
}

/// Tokens describing a value edit from `old` to `new`, as the inserted or
/// removed run when the change is a pure insertion or removal, the full new
/// value otherwise.
pub fn value_delta(old: &str, new: &str) -> Vec<OutputToken> {
    if old == new {
        return Vec::new();
    }
    let old_chars: Vec<char> = old.chars().collect();
    let new_chars: Vec<char> = new.chars().collect();

    let prefix = old_chars
        .iter()
        .zip(new_chars.iter())
        .take_while(|(a, b)| a == b)
        .count();
    let max_suffix = old_chars.len().min(new_chars.len()) - prefix;
    let suffix = old_chars
        .iter()
        .rev()
        .zip(new_chars.iter().rev())
        .take_while(|(a, b)| a == b)
        .count()
        .min(max_suffix);

    let removed: String = old_chars[prefix..old_chars.len() - suffix].iter().collect();
    let inserted: String = new_chars[prefix..new_chars.len() - suffix].iter().collect();

    match (removed.is_empty(), inserted.is_empty()) {
        (true, false) => vec![OutputToken::InsertedText(inserted)],
        (false, true) => vec![OutputToken::RemovedText(removed)],
        _ => vec![OutputToken::StringValue(new.to_string())],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::mock::MockGateway;
    use crate::input::MockKeyState;

    fn field_with(gw: &MockGateway, value: &str) -> crate::gateway::mock::MockElement {
        let app = gw.add_app(1, "App");
        let field = gw.add_child(&app, "AXTextField");
        gw.set_text(&field, Attr::Value, value);
        field
    }

    #[test]
    fn strategy_by_role() {
        assert_eq!(Reader::for_role(&Role::Row).strategy(), Strategy::PassThrough);
        assert_eq!(Reader::for_role(&Role::Cell).strategy(), Strategy::PassThrough);
        assert_eq!(Reader::for_role(&Role::Table).strategy(), Strategy::Container);
        assert_eq!(Reader::for_role(&Role::Outline).strategy(), Strategy::Container);
        assert_eq!(Reader::for_role(&Role::Button).strategy(), Strategy::Generic);
    }

    #[test]
    fn generic_read_orders_label_value_role_state_help() {
        let gw = MockGateway::new();
        let app = gw.add_app(1, "App");
        let cb = gw.add_child(&app, "AXCheckBox");
        gw.set_text(&cb, Attr::Title, "Wrap lines");
        gw.set(&cb, Attr::Value, AxValue::Bool(true));
        gw.set_text(&cb, Attr::RoleDescription, "checkbox");
        gw.set(&cb, Attr::Enabled, AxValue::Bool(false));
        gw.set_text(&cb, Attr::Help, "Toggles soft wrapping");

        let tokens = Reader::for_role(&Role::CheckBox).read(&gw, &cb).unwrap();
        assert_eq!(
            tokens,
            vec![
                OutputToken::Label("Wrap lines".into()),
                OutputToken::BoolValue(true),
                OutputToken::Role("checkbox".into()),
                OutputToken::Disabled,
                OutputToken::Help("Toggles soft wrapping".into()),
            ]
        );
    }

    #[test]
    fn description_substitutes_for_label_and_mutes_role() {
        let gw = MockGateway::new();
        let app = gw.add_app(1, "App");
        let img = gw.add_child(&app, "AXImage");
        gw.set_text(&img, Attr::Description, "Company logo");
        gw.set_text(&img, Attr::RoleDescription, "image");

        let tokens = Reader::for_role(&Role::Image).read(&gw, &img).unwrap();
        assert_eq!(tokens, vec![OutputToken::Label("Company logo".into())]);
    }

    #[test]
    fn title_element_supplies_label() {
        let gw = MockGateway::new();
        let app = gw.add_app(1, "App");
        let label = gw.add_child(&app, "AXStaticText");
        gw.set_text(&label, Attr::Title, "Port");
        let field = gw.add_child(&app, "AXTextField");
        gw.set(&field, Attr::TitleElement, AxValue::Element(label));
        gw.set_text(&field, Attr::Value, "8080");

        let tokens = Reader::for_role(&Role::TextField).read(&gw, &field).unwrap();
        assert_eq!(
            tokens,
            vec![
                OutputToken::Label("Port".into()),
                OutputToken::StringValue("8080".into()),
            ]
        );
    }

    #[test]
    fn value_description_wins_over_raw_value() {
        let gw = MockGateway::new();
        let app = gw.add_app(1, "App");
        let slider = gw.add_child(&app, "AXSlider");
        gw.set(&slider, Attr::Value, AxValue::Float(0.5));
        gw.set_text(&slider, Attr::ValueDescription, "50 percent");

        let tokens = Reader::for_role(&Role::Slider).read(&gw, &slider).unwrap();
        assert_eq!(tokens, vec![OutputToken::StringValue("50 percent".into())]);
    }

    #[test]
    fn string_value_carries_selected_text_edited_placeholder() {
        let gw = MockGateway::new();
        let app = gw.add_app(1, "App");
        let field = gw.add_child(&app, "AXTextField");
        gw.set_text(&field, Attr::Value, "hello world");
        gw.set_text(&field, Attr::SelectedText, "world");
        gw.set(&field, Attr::Edited, AxValue::Bool(true));
        gw.set_text(&field, Attr::Placeholder, "Search");

        let tokens = Reader::for_role(&Role::TextField).read(&gw, &field).unwrap();
        assert_eq!(
            tokens,
            vec![
                OutputToken::StringValue("hello world".into()),
                OutputToken::SelectedText("world".into()),
                OutputToken::Edited,
                OutputToken::PlaceholderValue("Search".into()),
            ]
        );
    }

    #[test]
    fn container_summary_reports_counts() {
        let gw = MockGateway::new();
        let app = gw.add_app(1, "App");
        let table = gw.add_child(&app, "AXTable");
        gw.set_text(&table, Attr::Title, "Processes");
        let r1 = gw.add_child(&table, "AXRow");
        let r2 = gw.add_child(&table, "AXRow");
        gw.set(
            &table,
            Attr::Rows,
            AxValue::Array(vec![AxValue::Element(r1), AxValue::Element(r2)]),
        );

        let tokens = Reader::for_role(&Role::Table)
            .read_summary(&gw, &table)
            .unwrap();
        assert_eq!(
            tokens,
            vec![
                OutputToken::Label("Processes".into()),
                OutputToken::RowCount(2),
            ]
        );
    }

    #[test]
    fn container_reads_single_selected_child_summary() {
        let gw = MockGateway::new();
        let app = gw.add_app(1, "App");
        let table = gw.add_child(&app, "AXTable");
        gw.set_text(&table, Attr::Title, "Files");
        gw.set_text(&table, Attr::RoleDescription, "table");
        let row = gw.add_child(&table, "AXRow");
        let cell = gw.add_child(&row, "AXCell");
        let text = gw.add_child(&cell, "AXStaticText");
        gw.set_text(&text, Attr::Value, "readme.md");
        gw.set(
            &table,
            Attr::SelectedRows,
            AxValue::Array(vec![AxValue::Element(row)]),
        );

        let tokens = Reader::for_role(&Role::Table).read(&gw, &table).unwrap();
        assert_eq!(
            tokens,
            vec![
                OutputToken::Label("Files".into()),
                OutputToken::Role("table".into()),
                // Row passes through to the cell, which passes through to the text.
                OutputToken::StringValue("readme.md".into()),
            ]
        );
    }

    #[test]
    fn container_counts_multiple_selected_children() {
        let gw = MockGateway::new();
        let app = gw.add_app(1, "App");
        let table = gw.add_child(&app, "AXTable");
        let r1 = gw.add_child(&table, "AXRow");
        let r2 = gw.add_child(&table, "AXRow");
        let r3 = gw.add_child(&table, "AXRow");
        gw.set(
            &table,
            Attr::SelectedRows,
            AxValue::Array(vec![
                AxValue::Element(r1),
                AxValue::Element(r2),
                AxValue::Element(r3),
            ]),
        );

        let tokens = Reader::for_role(&Role::Table).read(&gw, &table).unwrap();
        assert_eq!(tokens, vec![OutputToken::SelectedChildrenCount(3)]);
    }

    #[test]
    fn caret_move_without_arrows_reads_crossed_text() {
        let gw = MockGateway::new();
        let field = field_with(&gw, "abcdef");
        let keys = MockKeyState::new();

        let tokens = selection_delta(
            &gw,
            &field,
            TextRange::new(1, 0),
            TextRange::new(4, 0),
            &keys,
        )
        .unwrap();
        assert_eq!(tokens, vec![OutputToken::StringValue("bcd".into())]);
    }

    #[test]
    fn vertical_caret_move_reads_landing_line() {
        let gw = MockGateway::new();
        let field = field_with(&gw, "one\ntwo\nthree");
        let keys = MockKeyState::new();
        keys.press(keycode::DOWN);

        let tokens = selection_delta(
            &gw,
            &field,
            TextRange::new(0, 0),
            TextRange::new(5, 0),
            &keys,
        )
        .unwrap();
        assert_eq!(tokens, vec![OutputToken::StringValue("two".into())]);
    }

    #[test]
    fn unchanged_selection_with_arrow_is_boundary() {
        let gw = MockGateway::new();
        let field = field_with(&gw, "abc");
        let keys = MockKeyState::new();
        keys.press(keycode::RIGHT);

        let tokens = selection_delta(
            &gw,
            &field,
            TextRange::new(3, 0),
            TextRange::new(3, 0),
            &keys,
        )
        .unwrap();
        assert_eq!(tokens, vec![OutputToken::Boundary]);

        keys.release(keycode::RIGHT);
        let tokens = selection_delta(
            &gw,
            &field,
            TextRange::new(3, 0),
            TextRange::new(3, 0),
            &keys,
        )
        .unwrap();
        assert!(tokens.is_empty());
    }

    #[test]
    fn both_edges_moved_reports_replacement() {
        let gw = MockGateway::new();
        let field = field_with(&gw, "abcdef");
        let keys = MockKeyState::new();

        let tokens = selection_delta(
            &gw,
            &field,
            TextRange::new(0, 2),
            TextRange::new(3, 2),
            &keys,
        )
        .unwrap();
        assert_eq!(
            tokens,
            vec![
                OutputToken::StringValue("ab".into()),
                OutputToken::Unselected,
                OutputToken::StringValue("de".into()),
                OutputToken::Selected,
            ]
        );
    }

    #[test]
    fn left_edge_extension_grows_selection() {
        let gw = MockGateway::new();
        let field = field_with(&gw, "abcdef");
        let keys = MockKeyState::new();

        let tokens = selection_delta(
            &gw,
            &field,
            TextRange::span(3, 5),
            TextRange::span(1, 5),
            &keys,
        )
        .unwrap();
        assert_eq!(
            tokens,
            vec![
                OutputToken::SelectedTextGrew("bc".into()),
                OutputToken::Selected,
            ]
        );
    }

    #[test]
    fn value_delta_pure_insertion_and_removal() {
        assert_eq!(
            value_delta("abc", "abXYc"),
            vec![OutputToken::InsertedText("XY".into())]
        );
        assert_eq!(
            value_delta("abXYc", "abc"),
            vec![OutputToken::RemovedText("XY".into())]
        );
        assert_eq!(
            value_delta("color", "colour"),
            vec![OutputToken::InsertedText("u".into())]
        );
        assert!(value_delta("same", "same").is_empty());
    }

    #[test]
    fn value_delta_replacement_reads_new_value() {
        assert_eq!(
            value_delta("cat", "dog"),
            vec![OutputToken::StringValue("dog".into())]
        );
    }
}
