//! Account page suites.

use app_sim::page;
use net_intercept::RouteHandler;
use query_engine::{Predicate, Selector};
use serde_json::{json, Value};
use stub_spy::{Arg, StubBehavior};
use trellis_core_types::StaticResponse;

use crate::runner::Suite;

/// Matched by path so the suite follows a configured base URL.
pub const MESSAGES_PATH: &str = "/posts/1/messages";

/// `[data-cy="<value>"]`
pub fn data_cy(value: &str) -> Selector {
    Selector::attr("data-cy", value)
}

pub fn account_page() -> Suite {
    Suite::describe("Account Page")
        .before_each(|cy| {
            cy.visit("/account");
        })
        .it("SignIn/Reg button should have changed to Sign Out", |cy| {
            cy.get(data_cy(page::SIGN_OUT)).contains("Sign Out");
        })
        .it(
            "Should have a dropdown with options, select the 3rd to display",
            |cy| {
                cy.get(data_cy(page::DROPDOWN))
                    .find(Selector::tag("button"))
                    .click();
                cy.get(data_cy(page::DROPDOWN))
                    .find(Selector::tag("a"))
                    .alias("options");
                cy.get_alias("@options").last().click();
                cy.get(data_cy(page::SELECTION)).contains("License");
            },
        )
        .it("Should have one active and one disabled button", |cy| {
            cy.query("cyId", page::ACTIVE)
                .should(Predicate::be_enabled());
            cy.get(data_cy(page::NOT_ACTIVE))
                .should(Predicate::have_attr("disabled"));
            cy.query("cyId", page::ACTIVE)
                .parent()
                .should(row_layout());
        })
        .it(
            "Should be able to retrieve data from the database and intercept it",
            |cy| {
                cy.get(data_cy(page::GET_REAL_DATA)).click();
                cy.get(data_cy(page::DATA_DISPLAY))
                    .should(Predicate::contain_text("I made it!"));

                cy.intercept_with(
                    "GET",
                    MESSAGES_PATH,
                    RouteHandler::dynamic(|req| {
                        req.reply(StaticResponse::new(
                            200,
                            json!({ "success": "Intercepted data" }),
                        ))
                    }),
                )
                .alias("interceptedRequest");

                cy.get(data_cy(page::GET_INTERCEPTED_DATA)).click();
                cy.wait("@interceptedRequest");
                cy.get(data_cy(page::DATA_DISPLAY))
                    .should(Predicate::contain_text("Intercepted data"));
            },
        )
}

pub fn stubbing_geolocation() -> Suite {
    Suite::describe("Stubbing Geolocation")
        .before_each(|cy| {
            cy.visit("/account");
            cy.stub(
                "window.navigator.geolocation",
                "getCurrentPosition",
                fixed_position(11.1111, -11.1111),
            )
            .alias("getCurrentPosition");
        })
        .it("stubs the user location", |cy| {
            cy.get(data_cy(page::GET_LOCATION)).click();
            cy.get(data_cy(page::LOCATION_DISPLAY))
                .should(Predicate::have_text("Latitude: 11.1111, Longitude: -11.1111"));
        })
}

/// Parent of the active button lays its children out as an even row.
fn row_layout() -> Predicate {
    Predicate::satisfy("have class flex flex-row justify-evenly", |m| {
        let node = m.first().ok_or_else(|| "nothing matched".to_string())?;
        let missing: Vec<&str> = ["flex", "flex-row", "justify-evenly"]
            .into_iter()
            .filter(|class| !node.has_class(class))
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(format!("{} lacks class {}", node.describe(), missing.join(", ")))
        }
    })
}

/// Fake `getCurrentPosition` that answers synchronously through the success
/// callback.
fn fixed_position(latitude: f64, longitude: f64) -> StubBehavior {
    StubBehavior::calls_fake(move |args| {
        let position = json!({ "coords": { "latitude": latitude, "longitude": longitude } });
        match args.first().and_then(Arg::as_callback) {
            Some(success) => Ok(success(&[position])),
            None => Ok(Value::Null),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suites_mirror_the_account_spec_file() {
        let account = account_page();
        assert_eq!(account.tests().len(), 4);
        let geolocation = stubbing_geolocation();
        assert_eq!(geolocation.tests().len(), 1);

        let cy = geolocation.build(&geolocation.tests()[0]);
        let rendered: Vec<String> = cy.queue().iter().map(ToString::to_string).collect();
        assert_eq!(
            rendered[1],
            "stub window.navigator.geolocation.getCurrentPosition as @getCurrentPosition"
        );
    }

    #[test]
    fn row_layout_reports_missing_classes() {
        use trellis_core_types::{DomSnapshot, NewElement};

        let mut dom = DomSnapshot::new("body");
        let root = dom.root();
        let row = dom
            .append(root, NewElement::new("div").class("flex").class("flex-row"))
            .unwrap();
        let ids = [row];
        let matched = query_engine::Matched::new(&dom, &ids);
        let err = row_layout().evaluate(&matched).unwrap_err();
        assert!(err.to_string().contains("justify-evenly"));
    }
}
