//! Accessibility role vocabulary and the navigation predicates over it.

/// Element role, parsed from the OS role string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Role {
    Application,
    Browser,
    BusyIndicator,
    Button,
    Cell,
    CheckBox,
    ColorWell,
    Column,
    ComboBox,
    DateField,
    DisclosureTriangle,
    DockItem,
    Drawer,
    Grid,
    Group,
    GrowArea,
    Handle,
    Heading,
    Image,
    Incrementer,
    LevelIndicator,
    Link,
    List,
    Menu,
    MenuBar,
    MenuBarItem,
    MenuButton,
    MenuItem,
    Outline,
    PopUpButton,
    Popover,
    ProgressIndicator,
    RadioButton,
    RelevanceIndicator,
    Row,
    ScrollArea,
    ScrollBar,
    Sheet,
    Slider,
    SplitGroup,
    StaticText,
    TabGroup,
    Table,
    TextArea,
    TextField,
    TimeField,
    Toolbar,
    ValueIndicator,
    WebArea,
    Window,
    /// Role string outside the known vocabulary.
    Other(String),
}

impl Role {
    /// Parse the OS role string (`"AXButton"`, `"AXWindow"`, ...).
    pub fn from_ax(s: &str) -> Role {
        match s {
            "AXApplication" => Role::Application,
            "AXBrowser" => Role::Browser,
            "AXBusyIndicator" => Role::BusyIndicator,
            "AXButton" => Role::Button,
            "AXCell" => Role::Cell,
            "AXCheckBox" => Role::CheckBox,
            "AXColorWell" => Role::ColorWell,
            "AXColumn" => Role::Column,
            "AXComboBox" => Role::ComboBox,
            "AXDateField" => Role::DateField,
            "AXDisclosureTriangle" => Role::DisclosureTriangle,
            "AXDockItem" => Role::DockItem,
            "AXDrawer" => Role::Drawer,
            "AXGrid" => Role::Grid,
            "AXGroup" => Role::Group,
            "AXGrowArea" => Role::GrowArea,
            "AXHandle" => Role::Handle,
            "AXHeading" => Role::Heading,
            "AXImage" => Role::Image,
            "AXIncrementer" => Role::Incrementer,
            "AXLevelIndicator" => Role::LevelIndicator,
            "AXLink" => Role::Link,
            "AXList" => Role::List,
            "AXMenu" => Role::Menu,
            "AXMenuBar" => Role::MenuBar,
            "AXMenuBarItem" => Role::MenuBarItem,
            "AXMenuButton" => Role::MenuButton,
            "AXMenuItem" => Role::MenuItem,
            "AXOutline" => Role::Outline,
            "AXPopUpButton" => Role::PopUpButton,
            "AXPopover" => Role::Popover,
            "AXProgressIndicator" => Role::ProgressIndicator,
            "AXRadioButton" => Role::RadioButton,
            "AXRelevanceIndicator" => Role::RelevanceIndicator,
            "AXRow" => Role::Row,
            "AXScrollArea" => Role::ScrollArea,
            "AXScrollBar" => Role::ScrollBar,
            "AXSheet" => Role::Sheet,
            "AXSlider" => Role::Slider,
            "AXSplitGroup" => Role::SplitGroup,
            "AXStaticText" => Role::StaticText,
            "AXTabGroup" => Role::TabGroup,
            "AXTable" => Role::Table,
            "AXTextArea" => Role::TextArea,
            "AXTextField" => Role::TextField,
            "AXTimeField" => Role::TimeField,
            "AXToolbar" => Role::Toolbar,
            "AXValueIndicator" => Role::ValueIndicator,
            "AXWebArea" => Role::WebArea,
            "AXWindow" => Role::Window,
            other => Role::Other(other.to_string()),
        }
    }

    /// Roles exposed to the user regardless of label (the role clause of the
    /// interestingness predicate).
    pub fn is_interesting(&self) -> bool {
        matches!(
            self,
            Role::Browser
                | Role::BusyIndicator
                | Role::Button
                | Role::Cell
                | Role::CheckBox
                | Role::ColorWell
                | Role::ComboBox
                | Role::DateField
                | Role::DisclosureTriangle
                | Role::DockItem
                | Role::Drawer
                | Role::Grid
                | Role::GrowArea
                | Role::Handle
                | Role::Heading
                | Role::Image
                | Role::LevelIndicator
                | Role::Link
                | Role::List
                | Role::MenuBarItem
                | Role::MenuItem
                | Role::MenuButton
                | Role::Outline
                | Role::PopUpButton
                | Role::Popover
                | Role::ProgressIndicator
                | Role::RadioButton
                | Role::RelevanceIndicator
                | Role::Sheet
                | Role::Slider
                | Role::StaticText
                | Role::TabGroup
                | Role::Table
                | Role::TextArea
                | Role::TextField
                | Role::TimeField
                | Role::Toolbar
                | Role::ValueIndicator
                | Role::WebArea
        )
    }

    /// Roles not expected to contain navigable descendants.
    pub fn is_leaf(&self) -> bool {
        matches!(
            self,
            Role::BusyIndicator
                | Role::Button
                | Role::CheckBox
                | Role::ColorWell
                | Role::ComboBox
                | Role::DateField
                | Role::DisclosureTriangle
                | Role::DockItem
                | Role::Heading
                | Role::Image
                | Role::Incrementer
                | Role::LevelIndicator
                | Role::Link
                | Role::MenuBarItem
                | Role::MenuButton
                | Role::MenuItem
                | Role::PopUpButton
                | Role::ProgressIndicator
                | Role::RadioButton
                | Role::RelevanceIndicator
                | Role::ScrollBar
                | Role::Slider
                | Role::StaticText
                | Role::TextArea
                | Role::TextField
                | Role::TimeField
                | Role::ValueIndicator
        )
    }

    /// Navigation never crosses these via the parent chain.
    pub fn is_root(&self) -> bool {
        matches!(self, Role::Menu | Role::MenuBar | Role::Window)
    }

    /// Roles worth pushing OS keyboard focus onto after a move.
    pub fn takes_keyboard_focus(&self) -> bool {
        matches!(
            self,
            Role::Button
                | Role::CheckBox
                | Role::ColorWell
                | Role::ComboBox
                | Role::DateField
                | Role::Incrementer
                | Role::Link
                | Role::MenuBarItem
                | Role::MenuButton
                | Role::MenuItem
                | Role::PopUpButton
                | Role::RadioButton
                | Role::Slider
                | Role::TextArea
                | Role::TextField
                | Role::TimeField
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_and_unknown_roles() {
        assert_eq!(Role::from_ax("AXButton"), Role::Button);
        assert_eq!(Role::from_ax("AXWebArea"), Role::WebArea);
        assert_eq!(
            Role::from_ax("AXFancyWidget"),
            Role::Other("AXFancyWidget".to_string())
        );
    }

    #[test]
    fn role_classes() {
        assert!(Role::Button.is_interesting());
        assert!(Role::Button.is_leaf());
        assert!(!Role::Button.is_root());

        // Containers are interesting but not leaves.
        assert!(Role::Table.is_interesting());
        assert!(!Role::Table.is_leaf());

        // Groups are traversed but never surfaced by role alone.
        assert!(!Role::Group.is_interesting());
        assert!(!Role::Group.is_leaf());

        assert!(Role::Window.is_root());
        assert!(Role::Menu.is_root());
        assert!(Role::MenuBar.is_root());
        assert!(!Role::Window.is_interesting());

        // Incrementer and scroll bar are leaves without being interesting.
        assert!(Role::Incrementer.is_leaf());
        assert!(!Role::Incrementer.is_interesting());
        assert!(Role::ScrollBar.is_leaf());
    }

    #[test]
    fn keyboard_focus_roles() {
        assert!(Role::TextField.takes_keyboard_focus());
        assert!(Role::Link.takes_keyboard_focus());
        assert!(!Role::StaticText.takes_keyboard_focus());
        assert!(!Role::Table.takes_keyboard_focus());
    }
}
