//! Account page markup and element lookups.

use trellis_core_types::{DomSnapshot, ElementId, NewElement};

pub const SIGN_OUT: &str = "SignOut";
pub const DROPDOWN: &str = "Dropdown";
pub const DROPDOWN_MENU: &str = "DropdownMenu";
pub const SELECTION: &str = "Selection";
pub const ACTIVE: &str = "active";
pub const NOT_ACTIVE: &str = "notActive";
pub const GET_REAL_DATA: &str = "GetRealData";
pub const GET_INTERCEPTED_DATA: &str = "GetInterceptedData";
pub const DATA_DISPLAY: &str = "DataDisplay";
pub const GET_LOCATION: &str = "GetLocation";
pub const LOCATION_DISPLAY: &str = "LocationDisplay";

/// Entries shown once the dropdown is opened.
pub const MENU_ENTRIES: [&str; 3] = ["Profile", "Settings", "License"];

/// Freshly rendered account page. The dropdown menu starts closed.
pub fn account_page(url: &str) -> DomSnapshot {
    let mut dom = DomSnapshot::new("body");
    dom.url = Some(url.to_string());
    let root = dom.root();

    if let Some(nav) = dom.append(root, NewElement::new("nav")) {
        dom.append(
            nav,
            NewElement::new("button")
                .attr("data-cy", SIGN_OUT)
                .text("Sign Out"),
        );
    }

    if let Some(dropdown) = dom.append(root, NewElement::new("div").attr("data-cy", DROPDOWN)) {
        dom.append(dropdown, NewElement::new("button").text("Options"));
        dom.append(
            dropdown,
            NewElement::new("div")
                .attr("data-cy", DROPDOWN_MENU)
                .class("menu"),
        );
    }
    dom.append(root, NewElement::new("div").attr("data-cy", SELECTION));

    if let Some(row) = dom.append(
        root,
        NewElement::new("div")
            .class("flex")
            .class("flex-row")
            .class("justify-evenly"),
    ) {
        dom.append(
            row,
            NewElement::new("button")
                .attr("data-cy", ACTIVE)
                .text("Active"),
        );
        dom.append(
            row,
            NewElement::new("button")
                .attr("data-cy", NOT_ACTIVE)
                .attr("disabled", "")
                .text("Not Active"),
        );
    }

    if let Some(data) = dom.append(root, NewElement::new("section")) {
        dom.append(
            data,
            NewElement::new("button")
                .attr("data-cy", GET_REAL_DATA)
                .text("Get Real Data"),
        );
        dom.append(
            data,
            NewElement::new("button")
                .attr("data-cy", GET_INTERCEPTED_DATA)
                .text("Get Intercepted Data"),
        );
        dom.append(data, NewElement::new("div").attr("data-cy", DATA_DISPLAY));
    }

    if let Some(location) = dom.append(root, NewElement::new("section")) {
        dom.append(
            location,
            NewElement::new("button")
                .attr("data-cy", GET_LOCATION)
                .text("Get Location"),
        );
        dom.append(
            location,
            NewElement::new("div").attr("data-cy", LOCATION_DISPLAY),
        );
    }
    dom
}

pub fn not_found_page(url: &str) -> DomSnapshot {
    let mut dom = DomSnapshot::new("body");
    dom.url = Some(url.to_string());
    let root = dom.root();
    dom.append(root, NewElement::new("h1").text("404: page not found"));
    dom
}

pub fn find_by_cy(dom: &DomSnapshot, value: &str) -> Option<ElementId> {
    dom.document_order()
        .into_iter()
        .find(|id| dom.node(*id).and_then(|n| n.attr("data-cy")) == Some(value))
}

/// Nearest `data-cy` value on the element or one of its ancestors.
pub fn closest_cy(dom: &DomSnapshot, id: ElementId) -> Option<(ElementId, String)> {
    let mut current = Some(id);
    while let Some(candidate) = current {
        let node = dom.node(candidate)?;
        if let Some(value) = node.attr("data-cy") {
            return Some((candidate, value.to_string()));
        }
        current = node.parent;
    }
    None
}

/// Append the menu entries if the dropdown is still closed.
pub fn open_menu(dom: &mut DomSnapshot) -> bool {
    let Some(menu) = find_by_cy(dom, DROPDOWN_MENU) else {
        return false;
    };
    if dom.node(menu).map(|n| !n.children.is_empty()).unwrap_or(true) {
        return false;
    }
    for entry in MENU_ENTRIES {
        dom.append(menu, NewElement::new("a").attr("href", "#").text(entry));
    }
    true
}
