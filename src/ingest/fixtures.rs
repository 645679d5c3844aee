/// Test fixtures: representative payloads from the gauge network API.
///
/// Latest feed shape (`GET /geojson/latest`):
///   features[]
///     .properties.station_ref  - zero-padded station number (string)
///     .properties.station_name
///     .properties.sensor_ref   - "0001" level, "0002" temperature,
///                                "0003" voltage, "OD" datum
///     .properties.region_id
///     .properties.datetime     - RFC 3339
///     .properties.value        - the measurement as a STRING
///     .properties.err_code
///     .geometry.coordinates    - [lon, lat]
///
/// CSV files carry `YYYY-MM-DD HH:MM` timestamps without a zone.

/// Two stations. Sandy Mills reports level, temperature and voltage;
/// Ballybofey reports level and the OD datum.
pub(crate) fn fixture_latest_json() -> &'static str {
    r#"{
      "type": "FeatureCollection",
      "crs": { "type": "name", "properties": { "name": "EPSG:4326" } },
      "features": [
        {
          "type": "Feature",
          "properties": {
            "station_ref": "0000001041", "station_name": "Sandy Mills", "sensor_ref": "0001",
            "region_id": 3, "datetime": "2021-06-15T22:00:00Z", "value": "1.715", "err_code": 99,
            "url": "/0000001041/0001/", "csv_file": "/data/month/01041_0001.csv"
          },
          "geometry": { "type": "Point", "coordinates": [-7.575758, 54.838318] }
        },
        {
          "type": "Feature",
          "properties": {
            "station_ref": "0000001041", "station_name": "Sandy Mills", "sensor_ref": "0002",
            "region_id": 3, "datetime": "2021-06-15T22:00:00Z", "value": "14.800", "err_code": 99,
            "url": "/0000001041/0002/", "csv_file": "/data/month/01041_0002.csv"
          },
          "geometry": { "type": "Point", "coordinates": [-7.575758, 54.838318] }
        },
        {
          "type": "Feature",
          "properties": {
            "station_ref": "0000001041", "station_name": "Sandy Mills", "sensor_ref": "0003",
            "region_id": 3, "datetime": "2021-06-15T22:00:00Z", "value": "12.900", "err_code": 99,
            "url": "/0000001041/0003/", "csv_file": "/data/month/01041_0003.csv"
          },
          "geometry": { "type": "Point", "coordinates": [-7.575758, 54.838318] }
        },
        {
          "type": "Feature",
          "properties": {
            "station_ref": "0000001043", "station_name": "Ballybofey", "sensor_ref": "0001",
            "region_id": 3, "datetime": "2021-06-15T21:45:00+01:00", "value": "0.293", "err_code": 99,
            "url": "/0000001043/0001/", "csv_file": "/data/month/01043_0001.csv"
          },
          "geometry": { "type": "Point", "coordinates": [-7.790749, 54.799769] }
        },
        {
          "type": "Feature",
          "properties": {
            "station_ref": "0000001043", "station_name": "Ballybofey", "sensor_ref": "OD",
            "region_id": 3, "datetime": "2021-06-15T21:45:00+01:00", "value": "13.110", "err_code": 99,
            "url": "/0000001043/OD/", "csv_file": ""
          },
          "geometry": { "type": "Point", "coordinates": [-7.790749, 54.799769] }
        }
      ]
    }"#
}

/// A level feature whose timestamp is not RFC 3339.
pub(crate) fn fixture_latest_bad_datetime_json() -> &'static str {
    r#"{
      "type": "FeatureCollection",
      "features": [
        {
          "type": "Feature",
          "properties": {
            "station_ref": "0000001041", "station_name": "Sandy Mills", "sensor_ref": "0001",
            "region_id": 3, "datetime": "2021-06-15 22:00", "value": "1.715", "err_code": 99
          },
          "geometry": { "type": "Point", "coordinates": [-7.575758, 54.838318] }
        }
      ]
    }"#
}

/// Valid first feature, malformed value on the second: no partial result.
pub(crate) fn fixture_latest_bad_value_json() -> &'static str {
    r#"{
      "type": "FeatureCollection",
      "features": [
        {
          "type": "Feature",
          "properties": {
            "station_ref": "0000001041", "station_name": "Sandy Mills", "sensor_ref": "0001",
            "region_id": 3, "datetime": "2021-06-15T22:00:00Z", "value": "1.715", "err_code": 99
          },
          "geometry": { "type": "Point", "coordinates": [-7.575758, 54.838318] }
        },
        {
          "type": "Feature",
          "properties": {
            "station_ref": "0000001043", "station_name": "Ballybofey", "sensor_ref": "0001",
            "region_id": 3, "datetime": "2021-06-15T22:00:00Z", "value": "n/a", "err_code": 99
          },
          "geometry": { "type": "Point", "coordinates": [-7.790749, 54.799769] }
        }
      ]
    }"#
}

/// Day series for one level sensor.
pub(crate) fn fixture_level_series_csv() -> &'static str {
    "datetime,value\n\
     2021-06-15 00:00,0.461\n\
     2021-06-15 00:15,0.462\n\
     2021-06-15 00:30,0.466\n"
}

/// Day series for one temperature sensor.
pub(crate) fn fixture_temperature_series_csv() -> &'static str {
    "datetime,value\n\
     2021-06-15 00:00,14.8\n\
     2021-06-15 00:15,14.75\n"
}

/// Group matrix with one sparse cell (Station B has no 22:15 value yet) and
/// space-padded headers.
pub(crate) fn fixture_group_csv() -> &'static str {
    "Datetime, Sandy Mills ,Ballybofey\n\
     2021-06-15 22:00,0.466,0.053\n\
     2021-06-15 22:15,0.470,\n"
}
