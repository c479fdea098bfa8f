// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Canned portal markup and public-registry payloads

use serde_json::{Value, json};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_string_contains, method, path, query_param},
};

pub const PORTAL_PATH: &str = "/portal/Factura.html";
pub const CIVIL_REGISTRY_PATH: &str = "/modulo/consultar-cedula.php";
pub const TAX_REGISTRY_PATH: &str = "/rest/ConsolidadoContribuyente/obtenerPorNumerosRuc";
pub const ESTABLISHMENTS_PATH: &str = "/rest/Establecimiento/consultarPorNumeroRuc";

pub const SHORT_ID: &str = "1710034065";
pub const OTHER_SHORT_ID: &str = "1726386236";
pub const LONG_ID: &str = "1726386236001";
pub const BAD_CHECK_DIGIT: &str = "1710034066";
pub const LOGIN_TOKEN: &str = "vs-login";

pub fn partial_response(legal_name: &str, next_token: &str) -> String {
    format!(
        r#"<?xml version='1.0' encoding='UTF-8'?>
<partial-response><changes><update id="form:busquedaCompradorComp"><![CDATA[
<select><option value="05" selected="selected">CEDULA</option></select>
<input id="form:busquedaCompradorComp:compradorRazonSocial" type="text" value="{legal_name}" />
<input id="form:busquedaCompradorComp:compradorDireccion" type="text" value="AV. AMAZONAS" />
<input id="form:busquedaCompradorComp:compradorTelefono" type="text" value="0999999999" />
<input id="form:busquedaCompradorComp:compradorEmail" type="text" value="buyer@example.com" />
]]></update><update id="j_id1:javax.faces.ViewState:0"><![CDATA[{next_token}]]></update></changes></partial-response>"#
    )
}

pub fn civil_registry_page(name: &str) -> String {
    format!(
        r#"<table class="table"><tbody><tr>
<td id="name0"><a href="/detalle">{name}</a></td>
</tr></tbody></table>"#
    )
}

pub fn taxpayer_response(legal_name: &str, status: &str) -> Value {
    json!([{
        "numeroRuc": LONG_ID,
        "razonSocial": legal_name,
        "estadoContribuyenteRuc": status,
        "actividadEconomicaPrincipal": "ACTIVIDADES DE CONSULTORIA INFORMATICA",
        "tipoContribuyente": "PERSONA NATURAL",
        "regimen": "RIMPE",
        "obligadoLlevarContabilidad": "NO",
        "agenteRetencion": "NO",
        "motivoCancelacionSuspension": null
    }])
}

/// Portal answering buyer lookups for `identifier` with `legal_name`
pub async fn mount_portal_lookup(server: &MockServer, identifier: &str, legal_name: &str) {
    Mock::given(method("POST"))
        .and(path(PORTAL_PATH))
        .and(body_string_contains(identifier))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(partial_response(legal_name, "vs-next")),
        )
        .mount(server)
        .await;
}

/// Civil-registry mirror answering for `identifier`
pub async fn mount_civil_registry(server: &MockServer, identifier: &str, name: &str) {
    Mock::given(method("POST"))
        .and(path(CIVIL_REGISTRY_PATH))
        .and(body_string_contains(identifier))
        .respond_with(ResponseTemplate::new(200).set_body_string(civil_registry_page(name)))
        .mount(server)
        .await;
}

/// Civil-registry mirror with no row for `identifier`
pub async fn mount_civil_registry_miss(server: &MockServer, identifier: &str) {
    Mock::given(method("POST"))
        .and(path(CIVIL_REGISTRY_PATH))
        .and(body_string_contains(identifier))
        .respond_with(ResponseTemplate::new(200).set_body_string("<table></table>"))
        .mount(server)
        .await;
}

/// Tax registry and establishments answering for [`LONG_ID`]
pub async fn mount_tax_registry(server: &MockServer, legal_name: &str, status: &str) {
    Mock::given(method("GET"))
        .and(path(TAX_REGISTRY_PATH))
        .and(query_param("ruc", LONG_ID))
        .respond_with(ResponseTemplate::new(200).set_body_json(taxpayer_response(legal_name, status)))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(ESTABLISHMENTS_PATH))
        .and(query_param("numeroRuc", LONG_ID))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "direccionCompleta": "AV. 6 DE DICIEMBRE", "estado": "ABIERTO", "matriz": "SI" }
        ])))
        .mount(server)
        .await;
}
